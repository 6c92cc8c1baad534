//! Two-leg execution engine
//!
//! Drives one signal through the guarded state machine: admission, leg 1,
//! leg 2, unwind on a stranded fill, settlement. Leg ordering is
//! configurable; DEX-first is the default so a failed swap costs nothing
//! before the CEX order exists. Every attempt is bounded by a timeout and a
//! retry budget with exponential backoff. A timed-out adapter call is
//! dropped at the `timeout` boundary, so a late venue response can never
//! mutate a context that has already moved on.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::adapters::{CexAdapter, DexAdapter, OrderStatus};
use crate::capital::CapitalManager;
use crate::config::{ExecutorSettings, LegOrder};
use crate::errors::{AdapterError, BotError, FailureClassifier, FailureKind};
use crate::events::{BotEvent, EventBus};
use crate::recovery::RecoveryManager;
use crate::strategy::RouteHealth;
use crate::types::{
    Direction, ExecState, ExecutionContext, ExecutorStats, LegFill, OrderSide, Signal, TradingPair,
    Venue,
};

const POLL_INTERVAL_MS: u64 = 50;

/// What one leg attempt is asked to do.
#[derive(Debug, Clone, Copy)]
struct LegPlan {
    venue: Venue,
    side: OrderSide,
}

#[derive(Debug)]
struct LegFailure {
    kind: FailureKind,
    detail: String,
}

impl LegFailure {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

pub struct Executor {
    cex: Arc<dyn CexAdapter>,
    dex: Arc<dyn DexAdapter>,
    recovery: Arc<RecoveryManager>,
    capital: Arc<RwLock<CapitalManager>>,
    route_health: Arc<RwLock<RouteHealth>>,
    pairs: HashMap<String, TradingPair>,
    config: ExecutorSettings,
    events: EventBus,
    stats: RwLock<ExecutorStats>,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cex: Arc<dyn CexAdapter>,
        dex: Arc<dyn DexAdapter>,
        recovery: Arc<RecoveryManager>,
        capital: Arc<RwLock<CapitalManager>>,
        route_health: Arc<RwLock<RouteHealth>>,
        pairs: Vec<TradingPair>,
        config: ExecutorSettings,
        events: EventBus,
    ) -> Self {
        Self {
            cex,
            dex,
            recovery,
            capital,
            route_health,
            pairs: pairs.into_iter().map(|p| (p.symbol.clone(), p)).collect(),
            config,
            events,
            stats: RwLock::new(ExecutorStats::default()),
        }
    }

    pub async fn stats(&self) -> ExecutorStats {
        self.stats.read().await.clone()
    }

    /// Run the full lifecycle for one signal. Always returns a terminal
    /// context (unless the state machine itself is violated, which is a
    /// bug and aborts the execution where it stands).
    pub async fn execute(&self, signal: Signal) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(signal);
        self.stats.write().await.total += 1;

        match self.run(&mut ctx).await {
            Ok(()) => {}
            Err(BotError::InvalidStateTransition { from, to }) => {
                // A transition outside the table is a programming error.
                // Abort in place; never force the context into a terminal
                // state through an edge that does not exist.
                error!(
                    signal_id = %ctx.signal.signal_id,
                    from, to,
                    "invalid state transition; aborting execution"
                );
                ctx.failure_reason = Some(format!("invalid state transition {from} -> {to}"));
                self.events.emit(BotEvent::ExecutionFailed {
                    signal_id: ctx.signal.signal_id.clone(),
                    reason: "invalid state transition".to_string(),
                });
                return ctx;
            }
            Err(other) => {
                debug!(signal_id = %ctx.signal.signal_id, error = %other, "execution error path");
            }
        }

        self.settle(&mut ctx).await;
        ctx
    }

    // ── lifecycle ──

    async fn run(&self, ctx: &mut ExecutionContext) -> Result<(), BotError> {
        let signal = ctx.signal.clone();
        self.events.emit(BotEvent::ExecutionStarted {
            signal_id: signal.signal_id.clone(),
            execution_id: ctx.execution_id.clone(),
        });

        // Admission runs inside VALIDATING; a denial is a terminal failure
        // without any venue interaction.
        let capital_snapshot = self.capital.read().await.snapshot();
        self.step(ctx, ExecState::Validating, "pre-flight")?;
        if let Err(denied) = self.recovery.admit(&signal, &capital_snapshot).await {
            let reason = denied.to_string();
            ctx.failure_reason = Some(reason.clone());
            self.step_err(ctx, ExecState::Failed, "admission denied", Some(reason))?;
            return Ok(());
        }
        if signal.is_expired() {
            ctx.failure_reason = Some("signal expired before submission".to_string());
            self.step(ctx, ExecState::Failed, "signal expired")?;
            return Ok(());
        }

        let pair = match self.pairs.get(&signal.pair) {
            Some(pair) => pair.clone(),
            None => {
                ctx.failure_reason = Some(format!("unknown pair {}", signal.pair));
                self.step(ctx, ExecState::Failed, "unknown pair")?;
                return Ok(());
            }
        };

        let (leg1_plan, leg2_plan) = self.plan_legs(signal.direction);

        // ── leg 1 ──
        self.step(ctx, ExecState::Leg1Submitting, "submitting leg 1")?;
        self.events.emit(BotEvent::LegSubmitted {
            signal_id: signal.signal_id.clone(),
            leg: 1,
            venue: leg1_plan.venue.as_str().to_string(),
        });
        let leg1 = self.run_leg(ctx, &pair, leg1_plan, 1).await;
        let leg1 = match leg1 {
            Ok(fill) => fill,
            Err(failure) => {
                self.events.emit(BotEvent::LegFailed {
                    signal_id: signal.signal_id.clone(),
                    leg: 1,
                    kind: format!("{:?}", failure.kind),
                });
                ctx.failure_reason = Some(failure.detail.clone());
                self.step_err(ctx, ExecState::Leg1Failed, "leg 1 failed", Some(failure.detail))?;
                self.step(ctx, ExecState::Failed, "no position opened")?;
                return Ok(());
            }
        };
        self.events.emit(BotEvent::LegFilled {
            signal_id: signal.signal_id.clone(),
            leg: 1,
            venue: leg1.venue.as_str().to_string(),
            qty: leg1.filled_qty,
            price: leg1.avg_price,
        });
        ctx.leg1 = Some(leg1);
        self.step(ctx, ExecState::Leg1Filled, "leg 1 filled")?;

        // ── leg 2 ──
        self.step(ctx, ExecState::Leg2Submitting, "submitting leg 2")?;
        self.events.emit(BotEvent::LegSubmitted {
            signal_id: signal.signal_id.clone(),
            leg: 2,
            venue: leg2_plan.venue.as_str().to_string(),
        });
        let leg2 = self.run_leg(ctx, &pair, leg2_plan, 2).await;
        match leg2 {
            Ok(fill) => {
                self.events.emit(BotEvent::LegFilled {
                    signal_id: signal.signal_id.clone(),
                    leg: 2,
                    venue: fill.venue.as_str().to_string(),
                    qty: fill.filled_qty,
                    price: fill.avg_price,
                });
                ctx.leg2 = Some(fill);
                self.step(ctx, ExecState::Leg2Filled, "leg 2 filled")?;
                self.finish_done(ctx)?;
            }
            Err(failure) => {
                self.events.emit(BotEvent::LegFailed {
                    signal_id: signal.signal_id.clone(),
                    leg: 2,
                    kind: format!("{:?}", failure.kind),
                });
                ctx.failure_reason = Some(failure.detail.clone());
                self.step_err(
                    ctx,
                    ExecState::Unwinding,
                    "leg 2 failed, unwinding leg 1",
                    Some(failure.detail),
                )?;
                self.unwind(ctx, &pair).await?;
            }
        }
        Ok(())
    }

    /// Leg order per configuration: DEX-first posts the swap before the CEX
    /// order, CEX-first the reverse.
    fn plan_legs(&self, direction: Direction) -> (LegPlan, LegPlan) {
        let (dex_side, cex_side) = match direction {
            Direction::BuyDexSellCex => (OrderSide::Buy, OrderSide::Sell),
            Direction::BuyCexSellDex => (OrderSide::Sell, OrderSide::Buy),
        };
        let dex = LegPlan {
            venue: Venue::Dex,
            side: dex_side,
        };
        let cex = LegPlan {
            venue: Venue::Cex,
            side: cex_side,
        };
        match self.config.leg_order {
            LegOrder::DexFirst => (dex, cex),
            LegOrder::CexFirst => (cex, dex),
        }
    }

    async fn run_leg(
        &self,
        ctx: &mut ExecutionContext,
        pair: &TradingPair,
        plan: LegPlan,
        leg_no: u8,
    ) -> Result<LegFill, LegFailure> {
        // Leg 2 trades whatever leg 1 actually filled.
        let size_base = match &ctx.leg1 {
            Some(leg1) if leg_no == 2 => leg1.filled_qty,
            _ => ctx.signal.size_base,
        };
        let pending_state = if leg_no == 1 {
            ExecState::Leg1Pending
        } else {
            ExecState::Leg2Pending
        };
        let submitting_state = if leg_no == 1 {
            ExecState::Leg1Submitting
        } else {
            ExecState::Leg2Submitting
        };

        let mut last_failure = LegFailure::new(FailureKind::Unknown, "no attempts made");
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Retry edge back through SUBMITTING
                self.step(ctx, submitting_state, &format!("retry attempt {attempt}"))
                    .map_err(|e| LegFailure::new(FailureKind::Unknown, e.to_string()))?;
                self.backoff(attempt).await;
            }
            self.step(ctx, pending_state, "awaiting fill")
                .map_err(|e| LegFailure::new(FailureKind::Unknown, e.to_string()))?;

            let started = Instant::now();
            let result = match plan.venue {
                Venue::Cex => {
                    self.cex_leg_attempt(
                        &ctx.signal,
                        pair,
                        plan.side,
                        ctx.signal.cex_side_price,
                        size_base,
                    )
                    .await
                }
                Venue::Dex => self.dex_leg_attempt(&ctx.signal, pair, plan.side, size_base).await,
            };
            match result {
                Ok(mut fill) => {
                    fill.latency_ms = started.elapsed().as_millis() as u64;
                    fill.attempts = attempt + 1;
                    return Ok(fill);
                }
                Err(failure) => {
                    warn!(
                        signal_id = %ctx.signal.signal_id,
                        leg = leg_no,
                        attempt = attempt + 1,
                        kind = ?failure.kind,
                        detail = %failure.detail,
                        "leg attempt failed"
                    );
                    let retriable = failure.kind.is_retriable();
                    last_failure = failure;
                    if !retriable {
                        break;
                    }
                }
            }
        }
        Err(last_failure)
    }

    /// One CEX attempt: post-only placement, then poll to fill within the
    /// leg timeout. Cancels on timeout so nothing rests behind our back.
    async fn cex_leg_attempt(
        &self,
        signal: &Signal,
        pair: &TradingPair,
        side: OrderSide,
        price: Decimal,
        size_base: Decimal,
    ) -> Result<LegFill, LegFailure> {
        let deadline = Duration::from_millis(self.config.leg_timeout_ms);

        let order_id = tokio::time::timeout(
            deadline,
            self.cex.place_limit_postonly(pair, side, price, size_base),
        )
        .await
        .map_err(|_| LegFailure::new(FailureKind::Transient, "timeout placing order"))?
        .map_err(|e| LegFailure::new(FailureClassifier::classify_adapter(&e), e.to_string()))?;

        let placed_at = Instant::now();
        loop {
            if placed_at.elapsed() >= deadline {
                // Best-effort cancel; the order must not rest after we stop
                // watching it.
                if let Err(e) = self.cex.cancel(&order_id).await {
                    warn!(order_id = %order_id, error = %e, "cancel after timeout failed");
                }
                return Err(LegFailure::new(
                    FailureKind::Transient,
                    format!("order {order_id} timed out unfilled"),
                ));
            }
            match self.cex.poll_order(&order_id).await {
                Ok(OrderStatus::Filled { qty, avg_price }) => {
                    let fees_paid_usd =
                        qty * avg_price * Decimal::from(signal.fees.cex_fee_bps) / dec!(10_000);
                    return Ok(LegFill {
                        venue: Venue::Cex,
                        side,
                        filled_qty: qty,
                        avg_price,
                        venue_order_id: Some(order_id),
                        tx_hash: None,
                        fees_paid_usd,
                        latency_ms: 0,
                        attempts: 0,
                    });
                }
                Ok(OrderStatus::Rejected { reason }) => {
                    return Err(LegFailure::new(
                        FailureKind::Permanent,
                        format!("order rejected: {reason}"),
                    ));
                }
                Ok(OrderStatus::Canceled) => {
                    return Err(LegFailure::new(FailureKind::Transient, "order canceled"));
                }
                Ok(OrderStatus::Open) | Ok(OrderStatus::PartiallyFilled { .. }) => {
                    tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
                Err(e) => {
                    return Err(LegFailure::new(
                        FailureClassifier::classify_adapter(&e),
                        e.to_string(),
                    ));
                }
            }
        }
    }

    /// One DEX attempt: fresh quote on the signal's route, then swap.
    async fn dex_leg_attempt(
        &self,
        signal: &Signal,
        pair: &TradingPair,
        side: OrderSide,
        size_base: Decimal,
    ) -> Result<LegFill, LegFailure> {
        let deadline = Duration::from_millis(self.config.leg_timeout_ms);
        let map_adapter =
            |e: AdapterError| LegFailure::new(FailureClassifier::classify_adapter(&e), e.to_string());

        let (token_in, token_out, amount_in) = match side {
            // Buying base spends the quote notional; selling spends base.
            OrderSide::Buy => (
                pair.quote_token_address.as_str(),
                pair.token_address.as_str(),
                signal.size_quote,
            ),
            OrderSide::Sell => (
                pair.token_address.as_str(),
                pair.quote_token_address.as_str(),
                size_base,
            ),
        };

        let quote = tokio::time::timeout(
            deadline,
            self.dex
                .quote(token_in, token_out, amount_in, Some(&signal.route)),
        )
        .await
        .map_err(|_| LegFailure::new(FailureKind::Transient, "timeout fetching swap quote"))?
        .map_err(map_adapter)?;

        let receipt = tokio::time::timeout(
            deadline,
            self.dex.swap(
                &quote,
                self.config.dex_deadline_seconds,
                self.config.dex_slippage_bps,
                "core",
            ),
        )
        .await
        .map_err(|_| LegFailure::new(FailureKind::Transient, "timeout sending swap"))?
        .map_err(map_adapter)?;

        let (filled_qty, avg_price) = match side {
            OrderSide::Buy => (
                receipt.effective_out_amount,
                amount_in / receipt.effective_out_amount,
            ),
            OrderSide::Sell => (amount_in, receipt.effective_out_amount / amount_in),
        };
        Ok(LegFill {
            venue: Venue::Dex,
            side,
            filled_qty,
            avg_price,
            venue_order_id: None,
            tx_hash: Some(receipt.tx_hash),
            fees_paid_usd: receipt.gas_spent_usd,
            latency_ms: 0,
            attempts: 0,
        })
    }

    /// Reverse a stranded leg 1 on its own venue at the best available
    /// price. Success closes the execution as DONE with the realized loss;
    /// failure leaves the book unbalanced and flags manual intervention.
    async fn unwind(&self, ctx: &mut ExecutionContext, pair: &TradingPair) -> Result<(), BotError> {
        let Some(leg1) = ctx.leg1.clone() else {
            ctx.requires_manual_intervention = true;
            ctx.failure_reason = Some("unwind without a leg 1 fill".to_string());
            self.step(ctx, ExecState::Failed, "nothing to unwind")?;
            return Ok(());
        };

        self.events.emit(BotEvent::UnwindStarted {
            signal_id: ctx.signal.signal_id.clone(),
            venue: leg1.venue.as_str().to_string(),
        });
        info!(
            signal_id = %ctx.signal.signal_id,
            venue = leg1.venue.as_str(),
            qty = %leg1.filled_qty,
            "unwinding stranded leg"
        );

        let reverse = leg1.side.opposite();
        let mut last_error = String::from("no unwind attempts made");
        for attempt in 0..=self.config.unwind_max_retries {
            if attempt > 0 {
                self.backoff(attempt).await;
            }
            let result = match leg1.venue {
                // Aggressive limit: concede slippage tolerance off the
                // signal price to get taken quickly.
                Venue::Cex => {
                    let concession = Decimal::from(self.config.dex_slippage_bps) / dec!(10_000);
                    let price = match reverse {
                        OrderSide::Sell => ctx.signal.cex_side_price * (dec!(1) - concession),
                        OrderSide::Buy => ctx.signal.cex_side_price * (dec!(1) + concession),
                    };
                    self.cex_leg_attempt(&ctx.signal, pair, reverse, price, leg1.filled_qty)
                        .await
                }
                Venue::Dex => {
                    self.dex_leg_attempt(&ctx.signal, pair, reverse, leg1.filled_qty)
                        .await
                }
            };
            match result {
                Ok(mut fill) => {
                    fill.attempts = attempt + 1;
                    ctx.unwind = Some(fill);
                    self.finish_done(ctx)?;
                    return Ok(());
                }
                Err(failure) => {
                    warn!(
                        signal_id = %ctx.signal.signal_id,
                        attempt = attempt + 1,
                        detail = %failure.detail,
                        "unwind attempt failed"
                    );
                    last_error = failure.detail;
                }
            }
        }

        ctx.requires_manual_intervention = true;
        ctx.failure_reason = Some(format!("unwind failed: {last_error}"));
        self.step_err(
            ctx,
            ExecState::Failed,
            "unwind exhausted, manual intervention required",
            Some(last_error),
        )?;
        Ok(())
    }

    /// Realized P&L from actual fills, then DONE.
    fn finish_done(&self, ctx: &mut ExecutionContext) -> Result<(), BotError> {
        let legs: Vec<&LegFill> = [&ctx.leg1, &ctx.leg2, &ctx.unwind]
            .into_iter()
            .flatten()
            .collect();
        let mut buy_value = dec!(0);
        let mut sell_value = dec!(0);
        let mut fees = dec!(0);
        for leg in legs {
            let value = leg.filled_qty * leg.avg_price;
            match leg.side {
                OrderSide::Buy => buy_value += value,
                OrderSide::Sell => sell_value += value,
            }
            fees += leg.fees_paid_usd;
        }
        let pnl = sell_value - buy_value - fees - ctx.signal.fees.bridge_amortized_usd;
        ctx.actual_net_pnl_usd = Some(pnl);
        self.step(ctx, ExecState::Done, "execution complete")?;
        Ok(())
    }

    /// Settlement: capital first, then recovery, so the next admission for
    /// this pair observes the updated balances and breaker state.
    async fn settle(&self, ctx: &mut ExecutionContext) {
        if !ctx.is_terminal() {
            return;
        }
        // Anything that got past admission counts as an outcome; only
        // executions with actual fills touch balances. Capital settles
        // before recovery so the next admission for this pair sees the
        // updated snapshot.
        let attempted = ctx
            .events
            .iter()
            .any(|e| e.to_state == ExecState::Leg1Submitting);
        let has_fills = ctx.leg1.is_some() || ctx.leg2.is_some() || ctx.unwind.is_some();
        if has_fills {
            self.capital.write().await.apply_fill(ctx);
        }
        if attempted {
            self.recovery.record_outcome(&ctx.signal, ctx).await;
        }
        if has_fills {
            let success = ctx.state == ExecState::Done && ctx.unwind.is_none();
            let mut health = self.route_health.write().await;
            health.record_outcome(&ctx.signal.route, success);
            if let Some(dex_leg) = [&ctx.leg1, &ctx.leg2, &ctx.unwind]
                .into_iter()
                .flatten()
                .find(|l| l.venue == Venue::Dex)
            {
                health.record_gas(&ctx.signal.route, dex_leg.fees_paid_usd);
            }
        }

        let mut stats = self.stats.write().await;
        match ctx.state {
            ExecState::Done if ctx.unwind.is_none() => {
                stats.successful += 1;
                stats.total_pnl_usd += ctx.actual_net_pnl_usd.unwrap_or_default();
                self.events.emit(BotEvent::ExecutionDone {
                    signal_id: ctx.signal.signal_id.clone(),
                    pnl_usd: ctx.actual_net_pnl_usd.unwrap_or_default(),
                });
            }
            ExecState::Done => {
                stats.unwound += 1;
                stats.total_pnl_usd += ctx.actual_net_pnl_usd.unwrap_or_default();
                self.events.emit(BotEvent::ExecutionDone {
                    signal_id: ctx.signal.signal_id.clone(),
                    pnl_usd: ctx.actual_net_pnl_usd.unwrap_or_default(),
                });
            }
            _ => {
                stats.failed += 1;
                self.events.emit(BotEvent::ExecutionFailed {
                    signal_id: ctx.signal.signal_id.clone(),
                    reason: ctx
                        .failure_reason
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                });
            }
        }
    }

    // ── helpers ──

    fn step(&self, ctx: &mut ExecutionContext, next: ExecState, note: &str) -> Result<(), BotError> {
        self.step_err(ctx, next, note, None)
    }

    fn step_err(
        &self,
        ctx: &mut ExecutionContext,
        next: ExecState,
        note: &str,
        error: Option<String>,
    ) -> Result<(), BotError> {
        let from = ctx.state;
        ctx.transition_with_error(next, note, error)?;
        self.events.emit(BotEvent::StateTransition {
            signal_id: ctx.signal.signal_id.clone(),
            from: format!("{from:?}"),
            to: format!("{next:?}"),
        });
        Ok(())
    }

    async fn backoff(&self, attempt: u32) {
        let exp = self
            .config
            .backoff_base_ms
            .saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.config.backoff_cap_ms);
        let jitter = (capped as f64 * 0.1 * rand::random::<f64>()) as u64;
        tokio::time::sleep(Duration::from_millis(capped + jitter)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{SimCexAdapter, SimDexAdapter};
    use crate::config::{BreakerSettings, CapitalSettings, ReplaySettings};
    use crate::types::{FeeBreakdown, FeeTier, OrderBook, PriceLevel, RouteTag};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::collections::HashMap as StdHashMap;

    struct Harness {
        executor: Executor,
        cex: Arc<SimCexAdapter>,
        dex: Arc<SimDexAdapter>,
        capital: Arc<RwLock<CapitalManager>>,
        recovery: Arc<RecoveryManager>,
    }

    fn pair() -> TradingPair {
        TradingPair {
            symbol: "ARB/USDT".to_string(),
            venue_symbol: "ARBUSDT".to_string(),
            token_address: "0xbase".to_string(),
            quote_token_address: "0xquote".to_string(),
            fee_tier: FeeTier::Medium,
            pool_address: None,
            min_size_base: dec!(1),
        }
    }

    fn settings(leg_order: LegOrder) -> ExecutorSettings {
        ExecutorSettings {
            leg_order,
            max_retries: 1,
            backoff_base_ms: 10,
            backoff_cap_ms: 20,
            leg_timeout_ms: 250,
            unwind_max_retries: 2,
            max_concurrent_executions: 2,
            simulation_mode: true,
            dex_slippage_bps: 50,
            dex_deadline_seconds: 120,
        }
    }

    async fn harness(leg_order: LegOrder) -> Harness {
        let cex = Arc::new(SimCexAdapter::new());
        cex.set_book(
            "ARB/USDT",
            OrderBook {
                bids: vec![PriceLevel { price: dec!(1.26), size: dec!(500) }],
                asks: vec![PriceLevel { price: dec!(1.261), size: dec!(500) }],
            },
        )
        .await;
        let dex = Arc::new(SimDexAdapter::new());
        dex.register_pair(&pair(), dec!(1.2469), dec!(1.2431), RouteTag::Aggregator, 180_000)
            .await;

        let mut cm = CapitalManager::new(CapitalSettings {
            starting_cex_usd: dec!(100),
            starting_chain_usd: dec!(100),
            bridge_threshold_usd: dec!(20),
            bridge_fixed_cost_usd: dec!(0.05),
            amortization_target_trades: 20,
        });
        cm.deposit(Venue::Cex, "ARB", dec!(100));
        cm.deposit(Venue::Dex, "ARB", dec!(100));
        cm.mark_price("ARB", dec!(1.25));
        let capital = Arc::new(RwLock::new(cm));

        let recovery = Arc::new(RecoveryManager::new(
            BreakerSettings {
                failure_threshold: 3,
                window_seconds: 60.0,
                cooldown_seconds: 600.0,
                max_drawdown_usd: dec!(10),
            },
            ReplaySettings {
                ttl_seconds: 600.0,
                max_age_seconds: 30.0,
                lru_capacity: 1000,
                nonce_check: true,
            },
            EventBus::sink(),
        ));

        let executor = Executor::new(
            cex.clone(),
            dex.clone(),
            recovery.clone(),
            capital.clone(),
            Arc::new(RwLock::new(RouteHealth::new())),
            vec![pair()],
            settings(leg_order),
            EventBus::sink(),
        );
        Harness {
            executor,
            cex,
            dex,
            capital,
            recovery,
        }
    }

    fn executable_signal(id_salt: i64) -> Signal {
        let created = Utc::now();
        let fees = FeeBreakdown {
            cex_fee_bps: 0,
            dex_lp_fee_bps: 30,
            aggregator_fee_bps: 5,
            slippage_buffer_bps: 10,
            gas_usd: dec!(0.0054),
            bridge_amortized_usd: dec!(0.05),
        };
        let gross = dec!(105);
        let size_quote = dec!(20);
        Signal {
            signal_id: Signal::make_id("ARB/USDT", Direction::BuyDexSellCex, id_salt),
            pair: "ARB/USDT".to_string(),
            direction: Direction::BuyDexSellCex,
            size_base: size_quote / dec!(1.2469),
            size_quote,
            cex_side_price: dec!(1.26),
            dex_side_price: dec!(1.2469),
            gross_spread_bps: gross,
            expected_net_pnl_usd: fees.net_pnl_usd(size_quote, gross),
            breakeven_bps: fees.breakeven_bps(size_quote),
            fees,
            route: RouteTag::Aggregator,
            route_score_margin: dec!(0),
            score: 72.0,
            score_breakdown: None,
            created_at: created,
            expires_at: created + ChronoDuration::seconds(30),
            meta: StdHashMap::new(),
        }
    }

    fn states(ctx: &ExecutionContext) -> Vec<ExecState> {
        ctx.events.iter().map(|e| e.to_state).collect()
    }

    #[tokio::test]
    async fn test_happy_path_dex_first() {
        let h = harness(LegOrder::DexFirst).await;
        let ctx = h.executor.execute(executable_signal(1)).await;

        assert_eq!(ctx.state, ExecState::Done);
        assert!(ctx.unwind.is_none());
        let pnl = ctx.actual_net_pnl_usd.unwrap();
        assert!(pnl > dec!(0.10) && pnl < dec!(0.15), "pnl was {pnl}");

        // Leg 1 on the DEX, leg 2 on the CEX, sized by the leg-1 fill
        let leg1 = ctx.leg1.as_ref().unwrap();
        let leg2 = ctx.leg2.as_ref().unwrap();
        assert_eq!(leg1.venue, Venue::Dex);
        assert_eq!(leg1.side, OrderSide::Buy);
        assert_eq!(leg2.venue, Venue::Cex);
        assert_eq!(leg2.side, OrderSide::Sell);
        assert_eq!(leg2.filled_qty, leg1.filled_qty);

        // Audit trail is the declared happy path
        assert_eq!(
            states(&ctx),
            vec![
                ExecState::Validating,
                ExecState::Leg1Submitting,
                ExecState::Leg1Pending,
                ExecState::Leg1Filled,
                ExecState::Leg2Submitting,
                ExecState::Leg2Pending,
                ExecState::Leg2Filled,
                ExecState::Done,
            ]
        );

        let stats = h.executor.stats().await;
        assert_eq!(stats.successful, 1);
        assert_eq!(h.capital.read().await.realized_pnl_usd(), pnl);
    }

    #[tokio::test]
    async fn test_happy_path_cex_first() {
        let h = harness(LegOrder::CexFirst).await;
        let ctx = h.executor.execute(executable_signal(2)).await;
        assert_eq!(ctx.state, ExecState::Done);
        assert_eq!(ctx.leg1.as_ref().unwrap().venue, Venue::Cex);
        assert_eq!(ctx.leg2.as_ref().unwrap().venue, Venue::Dex);
    }

    #[tokio::test]
    async fn test_leg2_timeout_unwinds() {
        let h = harness(LegOrder::DexFirst).await;
        // CEX orders never fill: leg 2 times out on both attempts
        h.cex.set_fill_after_polls(None).await;

        let ctx = h.executor.execute(executable_signal(3)).await;

        assert_eq!(ctx.state, ExecState::Done);
        assert!(ctx.unwind.is_some());
        let pnl = ctx.actual_net_pnl_usd.unwrap();
        assert!(pnl < dec!(0), "unwind should realize a loss, got {pnl}");
        assert!(pnl > dec!(-0.30), "loss out of range: {pnl}");

        // No lost leg 1: the trail passes through UNWINDING
        assert!(states(&ctx).contains(&ExecState::Unwinding));
        assert!(!ctx.requires_manual_intervention);

        // The unwind counts as a failure for the breaker and stats
        let stats = h.executor.stats().await;
        assert_eq!(stats.unwound, 1);
        assert_eq!(stats.successful, 0);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_fills() {
        let h = harness(LegOrder::DexFirst).await;
        h.cex
            .script_place_failure(AdapterError::RateLimited("429".into()))
            .await;

        let ctx = h.executor.execute(executable_signal(4)).await;
        assert_eq!(ctx.state, ExecState::Done);
        // Leg 2 needed a second attempt through the retry edge
        assert_eq!(ctx.leg2.as_ref().unwrap().attempts, 2);
        let submits = states(&ctx)
            .iter()
            .filter(|s| **s == ExecState::Leg2Submitting)
            .count();
        assert_eq!(submits, 2);
    }

    #[tokio::test]
    async fn test_permanent_leg1_failure_fails_fast() {
        let h = harness(LegOrder::DexFirst).await;
        h.dex
            .script_swap_failure(AdapterError::Permanent("execution reverted".into()))
            .await;

        let ctx = h.executor.execute(executable_signal(5)).await;
        assert_eq!(ctx.state, ExecState::Failed);
        assert!(ctx.leg1.is_none());
        assert!(states(&ctx).contains(&ExecState::Leg1Failed));
        // Permanent: no retry attempted
        let submits = states(&ctx)
            .iter()
            .filter(|s| **s == ExecState::Leg1Submitting)
            .count();
        assert_eq!(submits, 1);
        // Nothing filled, so balances are untouched
        assert_eq!(h.capital.read().await.realized_pnl_usd(), dec!(0));
    }

    #[tokio::test]
    async fn test_unwind_failure_flags_manual_intervention() {
        let h = harness(LegOrder::DexFirst).await;
        // Leg 1 swap succeeds, then every unwind swap fails
        h.dex.script_swap_ok().await;
        for _ in 0..3 {
            h.dex
                .script_swap_failure(AdapterError::Permanent("execution reverted".into()))
                .await;
        }
        h.cex.set_fill_after_polls(None).await;

        let ctx = h.executor.execute(executable_signal(6)).await;
        assert_eq!(ctx.state, ExecState::Failed);
        assert!(ctx.requires_manual_intervention);
        assert!(ctx.failure_reason.as_ref().unwrap().contains("unwind failed"));
        // The toxic pair is halted
        assert!(h.recovery.breaker_open("ARB/USDT").await);
    }

    #[tokio::test]
    async fn test_replayed_signal_is_rejected() {
        let h = harness(LegOrder::DexFirst).await;
        let signal = executable_signal(7);
        let first = h.executor.execute(signal.clone()).await;
        assert_eq!(first.state, ExecState::Done);

        // Identical signal_id resubmitted: admission refuses, no legs run
        let second = h.executor.execute(signal).await;
        assert_eq!(second.state, ExecState::Failed);
        assert!(second.leg1.is_none());
        assert!(second
            .failure_reason
            .as_ref()
            .unwrap()
            .contains("duplicate"));
    }

    #[tokio::test]
    async fn test_oversized_trade_blocked_by_safety_gate() {
        let h = harness(LegOrder::DexFirst).await;
        let mut signal = executable_signal(8);
        signal.size_quote = dec!(30);

        let ctx = h.executor.execute(signal).await;
        assert_eq!(ctx.state, ExecState::Failed);
        assert!(ctx.leg1.is_none());
        assert!(ctx.failure_reason.as_ref().unwrap().contains("safety"));
    }

    #[tokio::test]
    async fn test_expired_signal_never_submits() {
        let h = harness(LegOrder::DexFirst).await;
        let mut signal = executable_signal(9);
        signal.created_at = Utc::now() - ChronoDuration::seconds(20);
        signal.expires_at = Utc::now() - ChronoDuration::seconds(15);

        let ctx = h.executor.execute(signal).await;
        assert_eq!(ctx.state, ExecState::Failed);
        assert!(ctx.leg1.is_none());
    }

    #[tokio::test]
    async fn test_pnl_consistency_across_executions() {
        let h = harness(LegOrder::DexFirst).await;
        let mut expected = dec!(0);
        for salt in 100..103 {
            let ctx = h.executor.execute(executable_signal(salt)).await;
            assert_eq!(ctx.state, ExecState::Done);
            expected += ctx.actual_net_pnl_usd.unwrap();
        }
        assert_eq!(h.capital.read().await.realized_pnl_usd(), expected);
        assert_eq!(h.executor.stats().await.total_pnl_usd, expected);
    }
}
