//! Signal scoring

use rust_decimal::prelude::*;
use std::collections::HashMap;

use crate::capital::SkewReport;
use crate::config::ScorerSettings;
use crate::types::{Direction, ScoreBreakdown, Signal};

const HISTORY_MIN_SAMPLES: usize = 3;

/// Scores signals 0-100 as a weighted sum of five normalized factors:
/// spread over breakeven, top-of-book depth, inventory impact, pair history,
/// and freshness. Signals below `min_score` are dropped by the caller.
pub struct SignalScorer {
    config: ScorerSettings,
    /// Per-pair EMA of realized-to-expected P&L ratio
    history: HashMap<String, (f64, usize)>,
}

impl SignalScorer {
    pub fn new(config: ScorerSettings) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    /// Score `signal` in place, attaching the factor breakdown. Returns the
    /// final score.
    pub fn score(&self, signal: &mut Signal, skews: &[SkewReport]) -> f64 {
        let spread = self.factor_spread(signal);
        let depth = self.factor_depth(signal);
        let inventory = self.factor_inventory(signal, skews);
        let history = self.factor_history(&signal.pair);
        let freshness = freshness_factor(signal.age_seconds(), signal.ttl_seconds());

        let [w_spread, w_depth, w_inventory, w_history, w_freshness] = self.config.weights;
        let final_score = (spread * w_spread
            + depth * w_depth
            + inventory * w_inventory
            + history * w_history
            + freshness * w_freshness)
            * 100.0;
        let final_score = final_score.clamp(0.0, 100.0);

        signal.score = (final_score * 10.0).round() / 10.0;
        signal.score_breakdown = Some(ScoreBreakdown {
            spread: spread * 100.0,
            depth: depth * 100.0,
            inventory: inventory * 100.0,
            history: history * 100.0,
            freshness: freshness * 100.0,
            final_score: signal.score,
        });
        signal.score
    }

    pub fn min_score(&self) -> f64 {
        self.config.min_score
    }

    /// Feed a realized outcome into the pair history EMA. `realized_ratio`
    /// is actual over expected net P&L, clamped to [0, 1].
    pub fn record_result(&mut self, pair: &str, realized_ratio: f64) {
        let alpha = self.config.history_ema_alpha;
        let clamped = realized_ratio.clamp(0.0, 1.0);
        let entry = self.history.entry(pair.to_string()).or_insert((0.5, 0));
        entry.0 = alpha * clamped + (1.0 - alpha) * entry.0;
        entry.1 += 1;
    }

    // ── factors, each in [0, 1] ──

    fn factor_spread(&self, signal: &Signal) -> f64 {
        let net_bps = signal.gross_spread_bps - signal.breakeven_bps;
        if net_bps <= Decimal::ZERO {
            return 0.0;
        }
        let target = self.config.target_spread_bps.to_f64().unwrap_or(100.0);
        if target <= 0.0 {
            return 1.0;
        }
        (net_bps.to_f64().unwrap_or(0.0) / target).clamp(0.0, 1.0)
    }

    fn factor_depth(&self, signal: &Signal) -> f64 {
        let depth = signal
            .meta
            .get("cex_top_depth_quote")
            .and_then(|v| v.parse::<f64>().ok());
        let Some(depth) = depth else {
            return 0.6; // neutral when depth data is missing
        };
        let target = self.config.target_depth_quote.to_f64().unwrap_or(500.0);
        if target <= 0.0 {
            return 1.0;
        }
        (depth / target).clamp(0.0, 1.0)
    }

    /// +1 if the trade reduces venue skew, 0 neutral, -1 if it worsens it,
    /// mapped onto [0, 1].
    fn factor_inventory(&self, signal: &Signal, skews: &[SkewReport]) -> f64 {
        let base = signal.pair.split('/').next().unwrap_or_default();
        let Some(skew) = skews.iter().find(|s| s.asset == base) else {
            return 0.5;
        };

        // BuyCexSellDex moves base onto the CEX; BuyDexSellCex moves base
        // on-chain.
        let rebalancing = match signal.direction {
            Direction::BuyCexSellDex => skew.wallet_deviation_pct > 0.0 && skew.cex_deviation_pct < 0.0,
            Direction::BuyDexSellCex => skew.cex_deviation_pct > 0.0 && skew.wallet_deviation_pct < 0.0,
        };

        if skew.max_deviation_pct < 5.0 {
            return 0.5;
        }
        if rebalancing {
            1.0
        } else {
            0.0
        }
    }

    fn factor_history(&self, pair: &str) -> f64 {
        match self.history.get(pair) {
            Some((ema, samples)) if *samples >= HISTORY_MIN_SAMPLES => ema.clamp(0.0, 1.0),
            _ => 0.5,
        }
    }
}

/// Linear freshness: 1 at creation, 0 at TTL expiry.
pub fn freshness_factor(age_seconds: f64, ttl_seconds: f64) -> f64 {
    if ttl_seconds <= 0.0 {
        return 0.0;
    }
    (1.0 - age_seconds / ttl_seconds).clamp(0.0, 1.0)
}
