//! Execution context persistence

use anyhow::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::info;

use crate::types::ExecutionContext;

/// Append-only JSON-lines audit of terminal execution contexts. Optional
/// for correctness, indispensable for post-mortems.
pub fn save_execution(ctx: &ExecutionContext) -> Result<()> {
    let filename = format!(
        "output/executions/executions_{}.jsonl",
        Utc::now().format("%Y-%m-%d")
    );

    let mut file = OpenOptions::new().create(true).append(true).open(&filename)?;
    writeln!(file, "{}", serde_json::to_string(ctx)?)?;

    info!(
        execution_id = %ctx.execution_id,
        signal_id = %ctx.signal.signal_id,
        state = ?ctx.state,
        pnl = ?ctx.actual_net_pnl_usd,
        "Saved execution context"
    );
    Ok(())
}
