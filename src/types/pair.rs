//! Trading pair configuration

use rust_decimal::Decimal;
use serde::Serialize;

/// Pool fee tier of the DEX side, in bps. Drives the per-tier minimum
/// spread floor applied by the signal generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FeeTier {
    /// 0.05% pools
    Low,
    /// 0.3% pools
    Medium,
    /// 1% pools
    High,
}

impl FeeTier {
    pub fn lp_fee_bps(&self) -> u32 {
        match self {
            FeeTier::Low => 5,
            FeeTier::Medium => 30,
            FeeTier::High => 100,
        }
    }
}

/// Immutable per-pair configuration. Built once at startup from the token
/// universe; everything downstream borrows it.
#[derive(Debug, Clone, Serialize)]
pub struct TradingPair {
    /// Canonical identifier, e.g. "ARB/USDT"
    pub symbol: String,
    /// Symbol as the CEX knows it, e.g. "ARBUSDT"
    pub venue_symbol: String,
    /// On-chain token address of the base asset
    pub token_address: String,
    /// Quote token address (stable side)
    pub quote_token_address: String,
    /// Preferred pool fee tier for direct-pool quotes
    pub fee_tier: FeeTier,
    /// Known pool for direct quoting; None restricts the pair to the
    /// aggregator route
    pub pool_address: Option<String>,
    /// Minimum tradable size in base units
    pub min_size_base: Decimal,
}

impl TradingPair {
    pub fn base(&self) -> &str {
        self.symbol.split('/').next().unwrap_or(&self.symbol)
    }

    pub fn quote(&self) -> &str {
        self.symbol.split('/').nth(1).unwrap_or("USDT")
    }
}
