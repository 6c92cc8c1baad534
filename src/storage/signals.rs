//! Signal persistence

use anyhow::Result;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::info;

use crate::types::Signal;

pub fn save_signal(signal: &Signal) -> Result<()> {
    let filename = format!("output/signals/signals_{}.jsonl", Utc::now().format("%Y-%m-%d"));

    let mut file = OpenOptions::new().create(true).append(true).open(&filename)?;
    writeln!(file, "{}", serde_json::to_string(signal)?)?;

    info!(
        signal_id = %signal.signal_id,
        pair = %signal.pair,
        score = signal.score,
        net = %signal.expected_net_pnl_usd,
        "Saved signal"
    );
    Ok(())
}
