//! CEX/DEX Arbitrage Bot - Main Entry Point
//!
//! Tick-driven control loop: generate signals per pair, score them, queue
//! them, and drain the queue through the two-leg executor under the
//! recovery plane's supervision.

use anyhow::Result;
use cex_dex_arb_bot::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::time;
use tracing::{debug, error, info, warn};

use cex_dex_arb_bot::capital::CapitalManager;
use cex_dex_arb_bot::events::{BotEvent, EventBus, EventRecord};
use cex_dex_arb_bot::execution::{default_markets, Executor, SimulationEnv};
use cex_dex_arb_bot::recovery::RecoveryManager;
use cex_dex_arb_bot::safety::is_kill_switch_active;
use cex_dex_arb_bot::strategy::{FeeModel, RouteHealth, SignalGenerator, SignalQueue, SignalScorer};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let _logging_guard = utils::setup_logging()?;
    utils::setup_output_directories()?;

    let config = Config::load();

    info!("🤖 CEX/DEX Arbitrage Bot v0.3.0 - Decision & Control Core");
    info!("📋 Configuration:");
    info!("   Trade Size: ${}", config.strategy.trade_size_usd);
    info!("   Min Profit: ${}", config.strategy.min_profit_usd);
    info!("   Min Spread: {} bps", config.strategy.min_spread_bps);
    info!("   Leg Order: {:?}", config.executor.leg_order);
    info!("   Simulation Mode: {}", config.executor.simulation_mode);
    info!(
        "   Breaker: {} failures / {}s window, cooldown {}s",
        config.breaker.failure_threshold,
        config.breaker.window_seconds,
        config.breaker.cooldown_seconds
    );

    validate_config(&config)?;

    // Live venue clients are wired behind the adapter traits by the
    // deployment build; this binary ships the simulated environment only.
    if !config.executor.simulation_mode {
        return Err(anyhow::anyhow!(
            "live venue adapters are not configured; set SIMULATION_MODE=true"
        ));
    }

    let (events, events_rx) = EventBus::new();
    spawn_event_writer(events_rx);

    let capital = Arc::new(RwLock::new(CapitalManager::new(config.capital.clone())));
    let markets = default_markets();
    let pairs: Vec<TradingPair> = markets.iter().map(|m| m.pair.clone()).collect();
    let env = SimulationEnv::bootstrap(&markets, &capital).await;

    let route_health = Arc::new(RwLock::new(RouteHealth::new()));
    let recovery = Arc::new(RecoveryManager::new(
        config.breaker.clone(),
        config.replay.clone(),
        events.clone(),
    ));
    let fee_model = FeeModel {
        cex_maker_fee_bps: config.cex_maker_fee_bps,
        slippage_buffer_bps: config.strategy.slippage_buffer_bps,
        gas_price_gwei: config.gas_price_gwei,
        native_token_usd: config.native_token_usd,
    };
    let generator = SignalGenerator::new(
        env.cex.clone(),
        env.dex.clone(),
        fee_model,
        config.strategy.clone(),
        capital.clone(),
        route_health.clone(),
        events.clone(),
    );
    let scorer = Arc::new(RwLock::new(SignalScorer::new(config.scorer.clone())));
    let queue = Arc::new(Mutex::new(SignalQueue::new(config.queue.clone())));
    let executor = Arc::new(Executor::new(
        env.cex.clone(),
        env.dex.clone(),
        recovery.clone(),
        capital.clone(),
        route_health.clone(),
        pairs.clone(),
        config.executor.clone(),
        events.clone(),
    ));
    let execution_slots = Arc::new(Semaphore::new(config.executor.max_concurrent_executions));
    let pairs_in_flight = Arc::new(Mutex::new(HashSet::<String>::new()));

    let start_time = Instant::now();
    let mut last_stats_print = Instant::now();
    let mut kill_switch_was_active = false;
    let mut cex_last_update: Option<Instant> = None;
    let mut dex_last_update: Option<Instant> = None;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    let shutdown_tx = Arc::new(Mutex::new(Some(shutdown_tx)));
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
            info!("📛 Received shutdown signal (Ctrl+C)...");
            if let Some(tx) = shutdown_tx.lock().await.take() {
                let _ = tx.send(());
            }
        }
    });

    info!("🚀 Starting main tick loop...");
    let mut interval = time::interval(Duration::from_secs(config.tick_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Kill switch pauses admission; in-flight executions finish.
                let kill_active = is_kill_switch_active();
                if kill_active != kill_switch_was_active {
                    kill_switch_was_active = kill_active;
                    if kill_active {
                        warn!("🛑 Kill switch active, pausing signal admission");
                        events.emit(BotEvent::KillSwitchActive);
                    } else {
                        info!("▶️  Kill switch cleared, resuming");
                        events.emit(BotEvent::KillSwitchCleared);
                    }
                }
                if kill_active {
                    continue;
                }

                let generated = run_tick(
                    &pairs,
                    &generator,
                    &scorer,
                    &queue,
                    &executor,
                    &capital,
                    &events,
                    &execution_slots,
                    &pairs_in_flight,
                ).await;
                if generated > 0 {
                    // A signal implies both venues answered this tick
                    cex_last_update = Some(Instant::now());
                    dex_last_update = Some(Instant::now());
                }

                // Bridge bookkeeping runs outside the hot path
                maybe_bridge(&capital, &events).await;

                if last_stats_print.elapsed() > Duration::from_secs(30) {
                    last_stats_print = Instant::now();
                    let health = utils::run_health_check(
                        &cex_last_update,
                        &dex_last_update,
                        &recovery,
                        start_time,
                    ).await;
                    info!(
                        "🏥 Health: CEX={}, DEX={}, breaker_open={}, kill_switch={}, uptime={}s",
                        if health.cex_connection { "OK" } else { "STALE" },
                        if health.dex_connection { "OK" } else { "STALE" },
                        health.breaker_open,
                        health.kill_switch_active,
                        health.uptime_seconds
                    );
                    let queue_stats = queue.lock().await.stats();
                    let exec_stats = executor.stats().await;
                    let recovery_snapshot = recovery.snapshot().await;
                    let pnl = capital.read().await.pnl_summary();
                    utils::print_session_stats(
                        start_time,
                        &queue_stats,
                        &exec_stats,
                        &recovery_snapshot,
                        &pnl,
                    );
                }
            }
            _ = &mut shutdown_rx => {
                info!("Shutdown signal received, exiting main loop...");
                break;
            }
        }
    }

    // Final statistics
    let exec_stats = executor.stats().await;
    let pnl = capital.read().await.pnl_summary();
    info!("🛑 Shutting down gracefully...");
    info!("   Total runtime: {:?}", start_time.elapsed());
    info!(
        "   Executions: {} total, {} ok, {} unwound, {} failed",
        exec_stats.total, exec_stats.successful, exec_stats.unwound, exec_stats.failed
    );
    info!(
        "   Realized P&L: ${:.4} over {} trades (win rate {:.0}%)",
        pnl.total_pnl_usd,
        pnl.total_trades,
        pnl.win_rate * 100.0
    );

    Ok(())
}

fn validate_config(config: &Config) -> Result<()> {
    let weight_sum: f64 = config.scorer.weights.iter().sum();
    if (weight_sum - 1.0).abs() > 1e-6 {
        return Err(anyhow::anyhow!("scorer weights must sum to 1.0, got {weight_sum}"));
    }
    if config.queue.max_per_pair == 0 || config.queue.max_depth == 0 {
        return Err(anyhow::anyhow!("queue bounds must be positive"));
    }
    if config.executor.max_concurrent_executions == 0 {
        return Err(anyhow::anyhow!("max_concurrent_executions must be positive"));
    }
    Ok(())
}

/// Drain incoming events to the log and the JSONL audit file.
fn spawn_event_writer(mut rx: tokio::sync::mpsc::UnboundedReceiver<EventRecord>) {
    tokio::spawn(async move {
        use std::io::Write;
        let path = format!(
            "output/events/events_{}.jsonl",
            chrono::Utc::now().format("%Y-%m-%d")
        );
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok();
        while let Some(record) = rx.recv().await {
            debug!(event = ?record.event, "bot event");
            if let (Some(f), Ok(line)) = (file.as_mut(), serde_json::to_string(&record)) {
                let _ = writeln!(f, "{line}");
            }
        }
    });
}

#[allow(clippy::too_many_arguments)]
async fn run_tick(
    pairs: &[TradingPair],
    generator: &SignalGenerator,
    scorer: &Arc<RwLock<SignalScorer>>,
    queue: &Arc<Mutex<SignalQueue>>,
    executor: &Arc<Executor>,
    capital: &Arc<RwLock<CapitalManager>>,
    events: &EventBus,
    execution_slots: &Arc<Semaphore>,
    pairs_in_flight: &Arc<Mutex<HashSet<String>>>,
) -> usize {
    // ── generate + score + queue ──
    let mut generated = 0;
    for pair in pairs {
        let Some(mut signal) = generator.generate(pair).await else {
            continue;
        };
        generated += 1;
        capital
            .write()
            .await
            .mark_price(pair.base(), signal.cex_side_price);

        let skews = capital.read().await.skew_reports(pairs);
        let score = scorer.read().await.score(&mut signal, &skews);
        events.emit(BotEvent::SignalScored {
            signal_id: signal.signal_id.clone(),
            score,
        });
        if score < scorer.read().await.min_score() {
            debug!(signal_id = %signal.signal_id, score, "signal below min score");
            events.emit(BotEvent::SignalDropped {
                signal_id: signal.signal_id.clone(),
                reason: format!("score {score:.1} below minimum"),
            });
            continue;
        }

        utils::print_signal(&signal);
        if let Err(e) = storage::save_signal(&signal) {
            error!("Failed to save signal: {e}");
        }

        let outcome = queue.lock().await.push(signal.clone());
        match outcome {
            strategy::PushOutcome::Queued => {
                events.emit(BotEvent::SignalQueued {
                    signal_id: signal.signal_id.clone(),
                    pair: signal.pair.clone(),
                });
            }
            strategy::PushOutcome::QueuedEvicted { dropped_id } => {
                events.emit(BotEvent::SignalQueued {
                    signal_id: signal.signal_id.clone(),
                    pair: signal.pair.clone(),
                });
                events.emit(BotEvent::SignalDropped {
                    signal_id: dropped_id,
                    reason: "evicted by higher-scored signal".to_string(),
                });
            }
            other => {
                events.emit(BotEvent::SignalDropped {
                    signal_id: signal.signal_id.clone(),
                    reason: format!("{other:?}"),
                });
            }
        }
    }

    // ── drain in descending score ──
    loop {
        let signal = {
            let mut q = queue.lock().await;
            q.pop_best()
        };
        let Some(signal) = signal else { break };

        // Strict per-pair serialization: requeue signals whose pair is
        // still executing so admission sees settled capital.
        {
            let mut in_flight = pairs_in_flight.lock().await;
            if in_flight.contains(&signal.pair) {
                queue.lock().await.push(signal);
                break;
            }
            in_flight.insert(signal.pair.clone());
        }

        let permit = match execution_slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let executor = executor.clone();
        let scorer = scorer.clone();
        let pairs_in_flight = pairs_in_flight.clone();
        tokio::spawn(async move {
            let expected = signal.expected_net_pnl_usd;
            let pair = signal.pair.clone();
            let ctx = executor.execute(signal).await;

            if let Err(e) = storage::save_execution(&ctx) {
                error!("Failed to save execution: {e}");
            }
            if let Some(actual) = ctx.actual_net_pnl_usd {
                use rust_decimal::prelude::ToPrimitive;
                let ratio = if expected > rust_decimal::Decimal::ZERO {
                    (actual / expected).to_f64().unwrap_or(0.0)
                } else {
                    0.0
                };
                scorer.write().await.record_result(&pair, ratio);
            }

            pairs_in_flight.lock().await.remove(&pair);
            drop(permit);
        });
    }
    generated
}

async fn maybe_bridge(capital: &Arc<RwLock<CapitalManager>>, events: &EventBus) {
    let mut cm = capital.write().await;
    if cm.should_bridge() {
        events.emit(BotEvent::BridgeRecommended {
            accumulated_usd: cm.pnl_since_bridge(),
        });
        // The transfer itself is an external concern; the core only resets
        // its amortization counters once the decision fires.
        cm.record_bridge();
    }
}
