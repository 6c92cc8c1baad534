//! Recovery manager: the single gate in front of the executor
//!
//! Composes the circuit breaker, the replay ledger and the absolute safety
//! gate behind two calls: `admit` before execution, `record_outcome` after.
//! The breaker and replay locks are never held at the same time; capital is
//! read by the caller before either is taken.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::capital::CapitalSnapshot;
use crate::config::{BreakerSettings, ReplaySettings};
use crate::errors::{BotError, BotResult, FailureClassifier, FailureKind};
use crate::events::{BotEvent, EventBus};
use crate::safety::{safety_check, SafetyVerdict};
use crate::types::{ExecState, ExecutionContext, Signal};

use super::breaker::{BreakerSnapshot, CircuitBreaker};
use super::replay::{ReplayLedger, ReplayStats};

const OUTCOME_HISTORY: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    pub signal_id: String,
    pub pair: String,
    pub success: bool,
    pub pnl_usd: Decimal,
    pub failure_kind: Option<FailureKind>,
}

/// Observability snapshot across the whole recovery plane.
#[derive(Debug, Clone, Serialize)]
pub struct RecoverySnapshot {
    pub breaker_global: BreakerSnapshot,
    pub replay: ReplayStats,
    pub recent_replay_decisions: Vec<super::replay::ReplayDecision>,
    pub recent_outcomes: Vec<OutcomeRecord>,
}

pub struct RecoveryManager {
    breaker: RwLock<CircuitBreaker>,
    replay: RwLock<ReplayLedger>,
    events: EventBus,
    outcomes: RwLock<VecDeque<OutcomeRecord>>,
}

impl RecoveryManager {
    pub fn new(
        breaker_settings: BreakerSettings,
        replay_settings: ReplaySettings,
        events: EventBus,
    ) -> Self {
        Self {
            breaker: RwLock::new(CircuitBreaker::new(breaker_settings, events.clone())),
            replay: RwLock::new(ReplayLedger::new(replay_settings)),
            events,
            outcomes: RwLock::new(VecDeque::new()),
        }
    }

    /// Pre-flight gate. Checks, in order: circuit breaker (global and
    /// per-pair), replay/staleness/nonce, then the hard-coded safety
    /// limits. The safety gate runs last on purpose: nothing may override
    /// it.
    pub async fn admit(&self, signal: &Signal, capital: &CapitalSnapshot) -> BotResult<()> {
        if let Err(scope) = self.breaker.write().await.try_admit_scoped(&signal.pair) {
            return Err(BotError::BreakerOpen { scope });
        }

        self.replay.write().await.check(signal)?;

        match safety_check(
            signal.size_quote,
            capital.daily_pnl_usd,
            capital.total_usd,
            capital.trades_last_hour,
        ) {
            SafetyVerdict::Ok => Ok(()),
            SafetyVerdict::Blocked { rule, detail } => {
                warn!(signal_id = %signal.signal_id, rule, %detail, "safety gate blocked execution");
                self.events.emit(BotEvent::SafetyViolation {
                    rule: rule.to_string(),
                    detail,
                });
                Err(BotError::SafetyViolation {
                    rule: rule.to_string(),
                })
            }
        }
    }

    /// Post-flight accounting. Marks the signal as executed in the replay
    /// ledger, classifies any failure, and feeds the breaker. An unwound
    /// execution counts as a failure even when it terminated in `Done`.
    pub async fn record_outcome(&self, signal: &Signal, ctx: &ExecutionContext) {
        self.replay.write().await.mark_executed(signal);

        let pnl = ctx.actual_net_pnl_usd.unwrap_or_default();
        let success = ctx.state == ExecState::Done && ctx.unwind.is_none();
        let failure_kind = if success {
            None
        } else {
            Some(
                ctx.failure_reason
                    .as_deref()
                    .map(FailureClassifier::classify_text)
                    .unwrap_or(FailureKind::Unknown),
            )
        };

        {
            let mut breaker = self.breaker.write().await;
            if success {
                breaker.record_success(&signal.pair, pnl);
            } else {
                breaker.record_failure(
                    &signal.pair,
                    failure_kind.unwrap_or(FailureKind::Unknown),
                    pnl,
                );
            }
            if ctx.requires_manual_intervention {
                breaker.trip_pair(&signal.pair, "unwind failed, manual intervention required");
            }
        }

        info!(
            signal_id = %signal.signal_id,
            state = ?ctx.state,
            success,
            pnl = %pnl,
            "recorded execution outcome"
        );

        let mut outcomes = self.outcomes.write().await;
        outcomes.push_back(OutcomeRecord {
            signal_id: signal.signal_id.clone(),
            pair: signal.pair.clone(),
            success,
            pnl_usd: pnl,
            failure_kind,
        });
        while outcomes.len() > OUTCOME_HISTORY {
            outcomes.pop_front();
        }
    }

    pub async fn snapshot(&self) -> RecoverySnapshot {
        let (replay_stats, recent_replay_decisions) = {
            let replay = self.replay.read().await;
            (replay.stats(), replay.recent_decisions(20))
        };
        RecoverySnapshot {
            breaker_global: self.breaker.write().await.global_snapshot(),
            replay: replay_stats,
            recent_replay_decisions,
            recent_outcomes: self.outcomes.read().await.iter().cloned().collect(),
        }
    }

    pub async fn breaker_open(&self, pair: &str) -> bool {
        self.breaker.write().await.is_open(pair)
    }

    pub async fn global_breaker_open(&self) -> bool {
        self.breaker.write().await.global_snapshot().mode == super::breaker::BreakerMode::Open
    }
}
