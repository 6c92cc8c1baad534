//! Bot configuration settings and environment variable handling

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;

// Bounds applied when loading from the environment
pub const MIN_TRADE_SIZE_USD: Decimal = dec!(5);
pub const MAX_TRADE_SIZE_USD: Decimal = dec!(25);
pub const MIN_PROFIT_FLOOR_USD: Decimal = dec!(0.01);
pub const MAX_SLIPPAGE_BUFFER_BPS: u32 = 100;
pub const MAX_LEG_TIMEOUT_MS: u64 = 120_000;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|s| Decimal::from_str(&s).ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub min_spread_bps: u32,
    pub min_profit_usd: Decimal,
    pub max_position_usd: Decimal,
    pub trade_size_usd: Decimal,
    pub signal_ttl_seconds: f64,
    pub cooldown_seconds: f64,
    /// Haircut applied in the fee model for expected execution slippage
    pub slippage_buffer_bps: u32,
    /// Spread floors per pool fee tier: (0.05%, 0.3%, 1%)
    pub tier_min_spread_bps: (u32, u32, u32),
}

#[derive(Debug, Clone)]
pub struct ScorerSettings {
    pub min_score: f64,
    /// Weights for spread, depth, inventory, history, freshness
    pub weights: [f64; 5],
    pub history_ema_alpha: f64,
    pub target_spread_bps: Decimal,
    pub target_depth_quote: Decimal,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_depth: usize,
    pub max_per_pair: usize,
    pub min_score: f64,
    pub decay_half_life_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegOrder {
    DexFirst,
    CexFirst,
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub leg_order: LegOrder,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub leg_timeout_ms: u64,
    pub unwind_max_retries: u32,
    pub max_concurrent_executions: usize,
    pub simulation_mode: bool,
    pub dex_slippage_bps: u32,
    pub dex_deadline_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub failure_threshold: usize,
    pub window_seconds: f64,
    pub cooldown_seconds: f64,
    pub max_drawdown_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct ReplaySettings {
    pub ttl_seconds: f64,
    pub max_age_seconds: f64,
    pub lru_capacity: usize,
    pub nonce_check: bool,
}

#[derive(Debug, Clone)]
pub struct CapitalSettings {
    pub starting_cex_usd: Decimal,
    pub starting_chain_usd: Decimal,
    pub bridge_threshold_usd: Decimal,
    pub bridge_fixed_cost_usd: Decimal,
    pub amortization_target_trades: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub strategy: StrategyConfig,
    pub scorer: ScorerSettings,
    pub queue: QueueSettings,
    pub executor: ExecutorSettings,
    pub breaker: BreakerSettings,
    pub replay: ReplaySettings,
    pub capital: CapitalSettings,
    pub cex_maker_fee_bps: u32,
    pub gas_price_gwei: Decimal,
    pub native_token_usd: Decimal,
    pub tick_interval_seconds: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            strategy: StrategyConfig {
                min_spread_bps: env_parse("MIN_SPREAD_BPS", 50),
                min_profit_usd: env_decimal("MIN_PROFIT_USD", dec!(0.05))
                    .max(MIN_PROFIT_FLOOR_USD),
                max_position_usd: env_decimal("MAX_POSITION_USD", dec!(25)),
                trade_size_usd: env_decimal("TRADE_SIZE_USD", dec!(20))
                    .max(MIN_TRADE_SIZE_USD)
                    .min(MAX_TRADE_SIZE_USD),
                signal_ttl_seconds: env_parse("SIGNAL_TTL_SECONDS", 5.0),
                cooldown_seconds: env_parse("COOLDOWN_SECONDS", 2.0),
                slippage_buffer_bps: env_parse("SLIPPAGE_BUFFER_BPS", 10u32)
                    .min(MAX_SLIPPAGE_BUFFER_BPS),
                tier_min_spread_bps: (
                    env_parse("TIER_LOW_MIN_SPREAD_BPS", 20),
                    env_parse("TIER_MEDIUM_MIN_SPREAD_BPS", 50),
                    env_parse("TIER_HIGH_MIN_SPREAD_BPS", 130),
                ),
            },
            scorer: ScorerSettings {
                min_score: env_parse("MIN_SCORE", 55.0),
                weights: [0.40, 0.20, 0.15, 0.15, 0.10],
                history_ema_alpha: env_parse("HISTORY_EMA_ALPHA", 0.15),
                target_spread_bps: env_decimal("TARGET_SPREAD_BPS", dec!(100)),
                target_depth_quote: env_decimal("TARGET_DEPTH_QUOTE", dec!(500)),
            },
            queue: QueueSettings {
                max_depth: env_parse("QUEUE_MAX_DEPTH", 32),
                max_per_pair: env_parse("QUEUE_MAX_PER_PAIR", 2),
                min_score: env_parse("QUEUE_MIN_SCORE", 55.0),
                decay_half_life_seconds: env_parse("QUEUE_DECAY_HALF_LIFE_SECONDS", 5.0),
            },
            executor: ExecutorSettings {
                leg_order: if env_parse("USE_DEX_FIRST", true) {
                    LegOrder::DexFirst
                } else {
                    LegOrder::CexFirst
                },
                max_retries: env_parse("MAX_LEG_RETRIES", 2),
                backoff_base_ms: env_parse("BACKOFF_BASE_MS", 250),
                backoff_cap_ms: env_parse("BACKOFF_CAP_MS", 5_000),
                leg_timeout_ms: env_parse("LEG_TIMEOUT_MS", 30_000u64).min(MAX_LEG_TIMEOUT_MS),
                unwind_max_retries: env_parse("UNWIND_MAX_RETRIES", 2),
                max_concurrent_executions: env_parse("MAX_CONCURRENT_EXECUTIONS", 2),
                simulation_mode: env_parse("SIMULATION_MODE", true),
                dex_slippage_bps: env_parse("DEX_SLIPPAGE_BPS", 50u32)
                    .min(MAX_SLIPPAGE_BUFFER_BPS),
                dex_deadline_seconds: env_parse("DEX_DEADLINE_SECONDS", 120),
            },
            breaker: BreakerSettings {
                failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", 3),
                window_seconds: env_parse("BREAKER_WINDOW_SECONDS", 300.0),
                cooldown_seconds: env_parse("BREAKER_COOLDOWN_SECONDS", 600.0),
                max_drawdown_usd: env_decimal("BREAKER_MAX_DRAWDOWN_USD", dec!(10)),
            },
            replay: ReplaySettings {
                ttl_seconds: env_parse("REPLAY_TTL_SECONDS", 600.0),
                max_age_seconds: env_parse("REPLAY_MAX_AGE_SECONDS", 30.0),
                lru_capacity: env_parse("REPLAY_LRU_CAPACITY", 10_000),
                nonce_check: env_parse("REPLAY_NONCE_CHECK", true),
            },
            capital: CapitalSettings {
                starting_cex_usd: env_decimal("STARTING_CEX_USD", dec!(50)),
                starting_chain_usd: env_decimal("STARTING_CHAIN_USD", dec!(50)),
                bridge_threshold_usd: env_decimal("BRIDGE_THRESHOLD_USD", dec!(20)),
                bridge_fixed_cost_usd: env_decimal("BRIDGE_FIXED_COST_USD", dec!(0.05)),
                amortization_target_trades: env_parse("AMORTIZATION_TARGET_TRADES", 20),
            },
            cex_maker_fee_bps: env_parse("CEX_MAKER_FEE_BPS", 0),
            gas_price_gwei: env_decimal("GAS_PRICE_GWEI", dec!(0.01)),
            native_token_usd: env_decimal("NATIVE_TOKEN_USD", dec!(3000)),
            tick_interval_seconds: env_parse("TICK_INTERVAL_SECONDS", 3),
        }
    }

    pub fn tier_min_spread_bps(&self, tier: crate::types::FeeTier) -> u32 {
        match tier {
            crate::types::FeeTier::Low => self.strategy.tier_min_spread_bps.0,
            crate::types::FeeTier::Medium => self.strategy.tier_min_spread_bps.1,
            crate::types::FeeTier::High => self.strategy.tier_min_spread_bps.2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeeTier;

    #[test]
    fn test_defaults_within_bounds() {
        let cfg = Config::load();
        assert!(cfg.strategy.trade_size_usd >= MIN_TRADE_SIZE_USD);
        assert!(cfg.strategy.trade_size_usd <= MAX_TRADE_SIZE_USD);
        assert!(cfg.executor.dex_slippage_bps <= MAX_SLIPPAGE_BUFFER_BPS);
        assert!((cfg.scorer.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tier_floor_lookup() {
        let cfg = Config::load();
        assert_eq!(cfg.tier_min_spread_bps(FeeTier::Low), 20);
        assert_eq!(cfg.tier_min_spread_bps(FeeTier::Medium), 50);
        assert_eq!(cfg.tier_min_spread_bps(FeeTier::High), 130);
    }
}
