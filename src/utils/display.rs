//! Console display helpers

use std::time::Instant;
use tracing::info;

use crate::capital::PnlSummary;
use crate::recovery::RecoverySnapshot;
use crate::strategy::QueueStats;
use crate::types::{ExecutorStats, Signal};

pub fn print_signal(signal: &Signal) {
    info!("💡 Signal {}", signal.signal_id);
    info!("   Pair: {} ({})", signal.pair, signal.direction.as_str());
    info!(
        "   Spread: {:.1} bps gross, breakeven {:.1} bps",
        signal.gross_spread_bps, signal.breakeven_bps
    );
    info!(
        "   Size: ${} | Expected net: ${:.4}",
        signal.size_quote, signal.expected_net_pnl_usd
    );
    info!("   Score: {:.1} via {}", signal.score, signal.route.label());
}

pub fn print_session_stats(
    start_time: Instant,
    queue: &QueueStats,
    executor: &ExecutorStats,
    recovery: &RecoverySnapshot,
    pnl: &PnlSummary,
) {
    info!("📊 Session statistics");
    info!("   Uptime: {:?}", start_time.elapsed());
    info!(
        "   Queue: {} queued, {} pushed, {} yielded, {} dropped",
        queue.queued, queue.total_pushed, queue.total_yielded, queue.total_dropped
    );
    info!(
        "   Executions: {} total, {} ok, {} unwound, {} failed (win rate {:.0}%)",
        executor.total,
        executor.successful,
        executor.unwound,
        executor.failed,
        executor.win_rate() * 100.0
    );
    info!(
        "   P&L: ${:.4} realized over {} trades (avg ${:.4} / {:.1} bps, best ${:.4}, worst ${:.4})",
        pnl.total_pnl_usd,
        pnl.total_trades,
        pnl.avg_pnl_usd,
        pnl.avg_pnl_bps,
        pnl.best_trade_usd,
        pnl.worst_trade_usd
    );
    info!(
        "   Breaker: {:?}, {} failures in window | Replay: {} ids tracked",
        recovery.breaker_global.mode,
        recovery.breaker_global.failures_in_window,
        recovery.replay.tracked_ids
    );
}
