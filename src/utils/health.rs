//! Health monitoring utilities

use std::time::Instant;

use crate::recovery::RecoveryManager;
use crate::safety::is_kill_switch_active;
use crate::types::HealthStatus;

const VENUE_STALENESS_SECONDS: u64 = 10;

pub async fn run_health_check(
    cex_last_update: &Option<Instant>,
    dex_last_update: &Option<Instant>,
    recovery: &RecoveryManager,
    start_time: Instant,
) -> HealthStatus {
    HealthStatus {
        cex_connection: cex_last_update
            .map(|t| t.elapsed().as_secs() < VENUE_STALENESS_SECONDS)
            .unwrap_or(false),
        dex_connection: dex_last_update
            .map(|t| t.elapsed().as_secs() < VENUE_STALENESS_SECONDS)
            .unwrap_or(false),
        last_cex_update: *cex_last_update,
        last_dex_update: *dex_last_update,
        breaker_open: recovery.global_breaker_open().await,
        kill_switch_active: is_kill_switch_active(),
        uptime_seconds: start_time.elapsed().as_secs(),
    }
}
