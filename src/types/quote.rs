//! DEX quote types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::FeeTier;

/// Where a DEX quote came from. Direct-pool quotes skip aggregator routing
/// and carry the pool identity for the swap call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum RouteTag {
    Aggregator,
    DirectPool { pool: String, fee_tier: FeeTier },
}

impl RouteTag {
    pub fn label(&self) -> &'static str {
        match self {
            RouteTag::Aggregator => "aggregator",
            RouteTag::DirectPool { .. } => "direct_pool",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DexQuote {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub gas_estimate_units: u64,
    /// amount_out / amount_in expressed in quote-per-base terms
    pub effective_price: Decimal,
    pub route: RouteTag,
    pub aggregator_fee_bps: u32,
    pub fetched_at: DateTime<Utc>,
}

impl DexQuote {
    pub fn age_seconds(&self) -> f64 {
        (Utc::now() - self.fetched_at).num_milliseconds() as f64 / 1_000.0
    }
}

/// Outcome of a submitted swap.
#[derive(Debug, Clone, Serialize)]
pub struct SwapReceipt {
    pub tx_hash: String,
    pub effective_out_amount: Decimal,
    pub gas_spent_usd: Decimal,
}
