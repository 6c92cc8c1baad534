//! Capital manager: balances, realized P&L, bridge amortization, skew
//!
//! Works in USD space for totals and amortization; per-asset balances are
//! tracked per venue and valued through the latest marks the tick loop
//! feeds in. Owned by the orchestrator and shared behind a lock.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::CapitalSettings;
use crate::errors::{BotError, BotResult};
use crate::types::{Direction, ExecutionContext, OrderSide, TradingPair, Venue};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const HOUR: Duration = Duration::from_secs(60 * 60);
/// Deviation beyond which a venue is flagged for rebalancing
const REBALANCE_DEVIATION_PCT: f64 = 30.0;

/// Venue distribution of one asset, deviations vs an even split.
#[derive(Debug, Clone, Serialize)]
pub struct SkewReport {
    pub asset: String,
    pub cex_deviation_pct: f64,
    pub wallet_deviation_pct: f64,
    pub max_deviation_pct: f64,
    pub needs_rebalance: bool,
}

/// Point-in-time view consumed by admission checks.
#[derive(Debug, Clone, Serialize)]
pub struct CapitalSnapshot {
    pub total_usd: Decimal,
    pub realized_pnl_usd: Decimal,
    pub daily_pnl_usd: Decimal,
    pub trades_last_hour: u32,
}

/// Aggregate trade statistics for the session report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PnlSummary {
    pub total_trades: u64,
    pub total_pnl_usd: Decimal,
    pub win_rate: f64,
    pub avg_pnl_usd: Decimal,
    /// Net P&L per unit of notional, in bps
    pub avg_pnl_bps: Decimal,
    pub best_trade_usd: Decimal,
    pub worst_trade_usd: Decimal,
    pub total_notional_usd: Decimal,
}

#[derive(Debug, Clone, Copy)]
struct TradeRecord {
    at: Instant,
    pnl_usd: Decimal,
    notional_usd: Decimal,
}

pub struct CapitalManager {
    config: CapitalSettings,
    cex_balances: HashMap<String, Decimal>,
    chain_balances: HashMap<String, Decimal>,
    /// USD marks per asset; stables default to 1
    marks: HashMap<String, Decimal>,
    realized_pnl_usd: Decimal,
    pnl_since_bridge_usd: Decimal,
    trades_since_last_bridge: u32,
    trades: VecDeque<TradeRecord>,
    settled_signals: HashSet<String>,
}

impl CapitalManager {
    pub fn new(config: CapitalSettings) -> Self {
        let mut cex_balances = HashMap::new();
        cex_balances.insert("USDT".to_string(), config.starting_cex_usd);
        let mut chain_balances = HashMap::new();
        chain_balances.insert("USDT".to_string(), config.starting_chain_usd);
        let mut marks = HashMap::new();
        marks.insert("USDT".to_string(), dec!(1));
        marks.insert("USDC".to_string(), dec!(1));
        Self {
            config,
            cex_balances,
            chain_balances,
            marks,
            realized_pnl_usd: dec!(0),
            pnl_since_bridge_usd: dec!(0),
            trades_since_last_bridge: 0,
            trades: VecDeque::new(),
            settled_signals: HashSet::new(),
        }
    }

    // ── balances ──

    pub fn deposit(&mut self, venue: Venue, asset: &str, amount: Decimal) {
        let book = self.venue_balances_mut(venue);
        *book.entry(asset.to_string()).or_default() += amount;
    }

    pub fn balance(&self, venue: Venue, asset: &str) -> Decimal {
        self.venue_balances(venue).get(asset).copied().unwrap_or_default()
    }

    pub fn mark_price(&mut self, asset: &str, usd: Decimal) {
        self.marks.insert(asset.to_string(), usd);
    }

    fn venue_balances(&self, venue: Venue) -> &HashMap<String, Decimal> {
        match venue {
            Venue::Cex => &self.cex_balances,
            Venue::Dex => &self.chain_balances,
        }
    }

    fn venue_balances_mut(&mut self, venue: Venue) -> &mut HashMap<String, Decimal> {
        match venue {
            Venue::Cex => &mut self.cex_balances,
            Venue::Dex => &mut self.chain_balances,
        }
    }

    fn valued(&self, balances: &HashMap<String, Decimal>) -> Decimal {
        balances
            .iter()
            .map(|(asset, amount)| {
                let mark = self.marks.get(asset).copied().unwrap_or_default();
                *amount * mark
            })
            .sum()
    }

    pub fn total_usd(&self) -> Decimal {
        self.valued(&self.cex_balances) + self.valued(&self.chain_balances)
    }

    // ── admission inputs ──

    pub fn snapshot(&self) -> CapitalSnapshot {
        let now = Instant::now();
        let daily_pnl_usd = self
            .trades
            .iter()
            .filter(|t| now.duration_since(t.at) <= DAY)
            .map(|t| t.pnl_usd)
            .sum();
        let trades_last_hour = self
            .trades
            .iter()
            .filter(|t| now.duration_since(t.at) <= HOUR)
            .count() as u32;
        CapitalSnapshot {
            total_usd: self.total_usd(),
            realized_pnl_usd: self.realized_pnl_usd,
            daily_pnl_usd,
            trades_last_hour,
        }
    }

    /// Pre-flight: both legs must be fundable at the chosen size. The buy
    /// side needs quote (with a 1% price cushion), the sell side base.
    pub fn can_execute(
        &self,
        pair: &TradingPair,
        direction: Direction,
        size_base: Decimal,
        size_quote: Decimal,
    ) -> BotResult<()> {
        let cushion = size_quote * dec!(1.01);
        let (quote_venue, base_venue) = match direction {
            Direction::BuyCexSellDex => (Venue::Cex, Venue::Dex),
            Direction::BuyDexSellCex => (Venue::Dex, Venue::Cex),
        };

        let quote_available = self.balance(quote_venue, pair.quote());
        if quote_available < cushion {
            return Err(BotError::InsufficientBalance {
                venue: quote_venue.as_str().to_string(),
                asset: pair.quote().to_string(),
                needed: cushion,
                available: quote_available,
            });
        }
        let base_available = self.balance(base_venue, pair.base());
        if base_available < size_base {
            return Err(BotError::InsufficientBalance {
                venue: base_venue.as_str().to_string(),
                asset: pair.base().to_string(),
                needed: size_base,
                available: base_available,
            });
        }
        Ok(())
    }

    // ── bridge amortization ──

    /// Amortized bridge cost charged to each candidate trade. The
    /// denominator is a forward-looking trade count clamped to the
    /// amortization target.
    pub fn effective_bridge_cost(&self) -> Decimal {
        let projected = (self.trades_since_last_bridge + 1)
            .clamp(1, self.config.amortization_target_trades.max(1));
        self.config.bridge_fixed_cost_usd / Decimal::from(projected)
    }

    /// True when profit accumulated since the last bridge justifies paying
    /// the fixed bridging cost.
    pub fn should_bridge(&self) -> bool {
        self.pnl_since_bridge_usd >= self.config.bridge_threshold_usd
    }

    pub fn pnl_since_bridge(&self) -> Decimal {
        self.pnl_since_bridge_usd
    }

    pub fn record_bridge(&mut self) {
        info!(
            accumulated = %self.pnl_since_bridge_usd,
            "bridge executed, resetting amortization counters"
        );
        self.trades_since_last_bridge = 0;
        self.pnl_since_bridge_usd = dec!(0);
    }

    // ── settlement ──

    /// Apply a terminal execution context: leg fill deltas, realized P&L,
    /// trade counters. Idempotent per signal_id; a second application of
    /// the same context is a no-op returning false.
    pub fn apply_fill(&mut self, ctx: &ExecutionContext) -> bool {
        if !ctx.is_terminal() {
            debug!(signal_id = %ctx.signal.signal_id, "ignoring non-terminal context");
            return false;
        }
        if !self.settled_signals.insert(ctx.signal.signal_id.clone()) {
            debug!(signal_id = %ctx.signal.signal_id, "context already settled");
            return false;
        }

        let pair = &ctx.signal.pair;
        let (base, quote) = split_pair(pair);
        for leg in [&ctx.leg1, &ctx.leg2, &ctx.unwind].into_iter().flatten() {
            let notional = leg.filled_qty * leg.avg_price;
            let book = self.venue_balances_mut(leg.venue);
            match leg.side {
                OrderSide::Buy => {
                    *book.entry(base.to_string()).or_default() += leg.filled_qty;
                    *book.entry(quote.to_string()).or_default() -= notional;
                }
                OrderSide::Sell => {
                    *book.entry(base.to_string()).or_default() -= leg.filled_qty;
                    *book.entry(quote.to_string()).or_default() += notional - leg.fees_paid_usd;
                }
            }
        }

        let pnl = ctx.actual_net_pnl_usd.unwrap_or_default();
        self.realized_pnl_usd += pnl;
        self.pnl_since_bridge_usd += pnl;
        self.trades_since_last_bridge += 1;
        self.trades.push_back(TradeRecord {
            at: Instant::now(),
            pnl_usd: pnl,
            notional_usd: ctx.signal.size_quote,
        });
        while self.trades.len() > 10_000 {
            self.trades.pop_front();
        }
        true
    }

    pub fn realized_pnl_usd(&self) -> Decimal {
        self.realized_pnl_usd
    }

    // ── skew ──

    pub fn skew(&self, asset: &str) -> SkewReport {
        let cex = self.balance(Venue::Cex, asset);
        let wallet = self.balance(Venue::Dex, asset);
        let total = cex + wallet;
        let (cex_dev, wallet_dev) = if total > dec!(0) {
            let cex_pct = (cex / total * dec!(100)).to_f64().unwrap_or(50.0);
            (cex_pct - 50.0, (100.0 - cex_pct) - 50.0)
        } else {
            (0.0, 0.0)
        };
        let max_dev = cex_dev.abs().max(wallet_dev.abs());
        SkewReport {
            asset: asset.to_string(),
            cex_deviation_pct: cex_dev,
            wallet_deviation_pct: wallet_dev,
            max_deviation_pct: max_dev,
            needs_rebalance: max_dev > REBALANCE_DEVIATION_PCT,
        }
    }

    pub fn skew_reports(&self, pairs: &[TradingPair]) -> Vec<SkewReport> {
        pairs.iter().map(|p| self.skew(p.base())).collect()
    }

    // ── reporting ──

    pub fn pnl_summary(&self) -> PnlSummary {
        if self.trades.is_empty() {
            return PnlSummary::default();
        }
        let total = self.trades.len() as u64;
        let wins = self.trades.iter().filter(|t| t.pnl_usd > dec!(0)).count();
        let total_pnl: Decimal = self.trades.iter().map(|t| t.pnl_usd).sum();
        let best = self.trades.iter().map(|t| t.pnl_usd).max().unwrap_or_default();
        let worst = self.trades.iter().map(|t| t.pnl_usd).min().unwrap_or_default();
        let notional: Decimal = self.trades.iter().map(|t| t.notional_usd).sum();
        let avg_pnl_bps = if notional > dec!(0) {
            total_pnl / notional * dec!(10_000)
        } else {
            dec!(0)
        };
        PnlSummary {
            total_trades: total,
            total_pnl_usd: total_pnl,
            win_rate: wins as f64 / total as f64,
            avg_pnl_usd: total_pnl / Decimal::from(total),
            avg_pnl_bps,
            best_trade_usd: best,
            worst_trade_usd: worst,
            total_notional_usd: notional,
        }
    }
}

fn split_pair(pair: &str) -> (&str, &str) {
    let mut parts = pair.split('/');
    let base = parts.next().unwrap_or(pair);
    let quote = parts.next().unwrap_or("USDT");
    (base, quote)
}
