//! Arbitrage signal types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use super::RouteTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    /// Buy at the CEX ask, sell into the DEX
    BuyCexSellDex,
    /// Buy from the DEX, sell at the CEX bid
    BuyDexSellCex,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::BuyCexSellDex => "buy_cex_sell_dex",
            Direction::BuyDexSellCex => "buy_dex_sell_cex",
        }
    }
}

/// Full cost model attached to a signal. All bps figures apply to the
/// quote-side notional; gas and bridge amortization are flat USD.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeeBreakdown {
    pub cex_fee_bps: u32,
    pub dex_lp_fee_bps: u32,
    pub aggregator_fee_bps: u32,
    pub slippage_buffer_bps: u32,
    pub gas_usd: Decimal,
    pub bridge_amortized_usd: Decimal,
}

impl FeeBreakdown {
    pub fn total_fee_bps(&self) -> u32 {
        self.cex_fee_bps + self.dex_lp_fee_bps + self.aggregator_fee_bps + self.slippage_buffer_bps
    }

    /// Expected net profit for a trade of `size_quote` USD at `gross_spread_bps`.
    pub fn net_pnl_usd(&self, size_quote: Decimal, gross_spread_bps: Decimal) -> Decimal {
        let fee_bps = Decimal::from(self.total_fee_bps());
        size_quote * (gross_spread_bps - fee_bps) / dec!(10_000)
            - self.gas_usd
            - self.bridge_amortized_usd
    }

    /// Spread at which the trade breaks even, in bps of notional.
    pub fn breakeven_bps(&self, size_quote: Decimal) -> Decimal {
        let flat = self.gas_usd + self.bridge_amortized_usd;
        let flat_bps = if size_quote > dec!(0) {
            flat / size_quote * dec!(10_000)
        } else {
            dec!(0)
        };
        Decimal::from(self.total_fee_bps()) + flat_bps
    }
}

/// Per-factor scores attached by the scorer, for explainability.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreBreakdown {
    pub spread: f64,
    pub depth: f64,
    pub inventory: f64,
    pub history: f64,
    pub freshness: f64,
    pub final_score: f64,
}

/// A validated arbitrage opportunity. Read-only after creation except for
/// the scorer-set fields.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub signal_id: String,
    pub pair: String,
    pub direction: Direction,

    pub size_base: Decimal,
    pub size_quote: Decimal,
    pub cex_side_price: Decimal,
    pub dex_side_price: Decimal,
    pub gross_spread_bps: Decimal,

    pub fees: FeeBreakdown,
    pub expected_net_pnl_usd: Decimal,
    pub breakeven_bps: Decimal,

    pub route: RouteTag,
    /// Net-score advantage of the chosen route over the best alternative
    pub route_score_margin: Decimal,

    pub score: f64,
    pub score_breakdown: Option<ScoreBreakdown>,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,

    pub meta: HashMap<String, String>,
}

impl Signal {
    /// Deterministic id over (pair, direction, creation_ns). Two signals
    /// built from the same inputs in the same nanosecond collide on purpose:
    /// the replay ledger treats them as one.
    pub fn make_id(pair: &str, direction: Direction, created_ns: i64) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        pair.hash(&mut hasher);
        direction.hash(&mut hasher);
        created_ns.hash(&mut hasher);
        format!("{}-{:016x}", pair.replace('/', ""), hasher.finish())
    }

    pub fn age_seconds(&self) -> f64 {
        (Utc::now() - self.created_at).num_milliseconds() as f64 / 1_000.0
    }

    pub fn ttl_seconds(&self) -> f64 {
        (self.expires_at - self.created_at).num_milliseconds() as f64 / 1_000.0
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Derived predicate: the spread clears the pool-tier floor and the net
    /// profit clears the configured minimum.
    pub fn executable(&self, tier_min_spread_bps: u32, min_profit_usd: Decimal) -> bool {
        self.gross_spread_bps >= Decimal::from(tier_min_spread_bps)
            && self.expected_net_pnl_usd >= min_profit_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeeTier;
    use chrono::Duration;

    fn sample_signal(pair: &str, direction: Direction, size_quote: Decimal) -> Signal {
        let created = Utc::now();
        let fees = FeeBreakdown {
            cex_fee_bps: 0,
            dex_lp_fee_bps: 30,
            aggregator_fee_bps: 0,
            slippage_buffer_bps: 10,
            gas_usd: dec!(0.02),
            bridge_amortized_usd: dec!(0.01),
        };
        let gross = dec!(105);
        Signal {
            signal_id: Signal::make_id(
                pair,
                direction,
                created.timestamp_nanos_opt().unwrap_or_default(),
            ),
            pair: pair.to_string(),
            direction,
            size_base: size_quote / dec!(1.25),
            size_quote,
            cex_side_price: dec!(1.26),
            dex_side_price: dec!(1.2469),
            gross_spread_bps: gross,
            expected_net_pnl_usd: fees.net_pnl_usd(size_quote, gross),
            breakeven_bps: fees.breakeven_bps(size_quote),
            fees,
            route: RouteTag::DirectPool {
                pool: "0xpool".to_string(),
                fee_tier: FeeTier::Medium,
            },
            route_score_margin: dec!(0),
            score: 0.0,
            score_breakdown: None,
            created_at: created,
            expires_at: created + Duration::seconds(5),
            meta: HashMap::new(),
        }
    }

    #[test]
    fn test_id_deterministic() {
        let a = Signal::make_id("ARB/USDT", Direction::BuyDexSellCex, 123);
        let b = Signal::make_id("ARB/USDT", Direction::BuyDexSellCex, 123);
        let c = Signal::make_id("ARB/USDT", Direction::BuyCexSellDex, 123);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_net_pnl_identity() {
        let s = sample_signal("ARB/USDT", Direction::BuyDexSellCex, dec!(20));
        // net = 20 * (105 - 40) / 10_000 - 0.02 - 0.01 = 0.13 - 0.03
        assert_eq!(s.expected_net_pnl_usd, dec!(0.10));
    }

    #[test]
    fn test_executable_gates() {
        let s = sample_signal("ARB/USDT", Direction::BuyDexSellCex, dec!(20));
        assert!(s.executable(30, dec!(0.05)));
        // Tier floor above the spread blocks it
        assert!(!s.executable(200, dec!(0.05)));
        // Min profit above the net blocks it
        assert!(!s.executable(30, dec!(5)));
    }

    #[test]
    fn test_breakeven_includes_flat_costs() {
        let s = sample_signal("ARB/USDT", Direction::BuyDexSellCex, dec!(20));
        // 40 bps of fees + $0.03 flat on $20 = 15 bps
        assert_eq!(s.breakeven_bps, dec!(55));
    }
}
