//! Health status types

use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub cex_connection: bool,
    pub dex_connection: bool,
    pub last_cex_update: Option<Instant>,
    pub last_dex_update: Option<Instant>,
    pub breaker_open: bool,
    pub kill_switch_active: bool,
    pub uptime_seconds: u64,
}

/// Aggregate executor counters surfaced in session stats.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutorStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub unwound: u64,
    pub total_pnl_usd: rust_decimal::Decimal,
}

impl ExecutorStats {
    pub fn win_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.successful as f64 / self.total as f64
    }
}
