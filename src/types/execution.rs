//! Execution state machine types and audit trail

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::Signal;
use crate::errors::BotError;

/// States of the two-leg execution lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExecState {
    Idle,
    Validating,
    Leg1Submitting,
    Leg1Pending,
    Leg1Filled,
    Leg1Failed,
    Leg2Submitting,
    Leg2Pending,
    Leg2Filled,
    Unwinding,
    Done,
    Failed,
}

impl ExecState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecState::Done | ExecState::Failed)
    }

    /// The full transition table. Any edge not listed here is a bug, not a
    /// recoverable condition.
    pub fn allowed_next(&self) -> &'static [ExecState] {
        use ExecState::*;
        match self {
            Idle => &[Validating, Failed],
            Validating => &[Leg1Submitting, Failed],
            Leg1Submitting => &[Leg1Pending, Leg1Failed],
            Leg1Pending => &[Leg1Filled, Leg1Failed, Leg1Submitting],
            Leg1Failed => &[Failed],
            Leg1Filled => &[Leg2Submitting],
            Leg2Submitting => &[Leg2Pending, Unwinding],
            Leg2Pending => &[Leg2Filled, Unwinding, Leg2Submitting],
            Leg2Filled => &[Done],
            Unwinding => &[Done, Failed],
            Done | Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: ExecState) -> bool {
        self.allowed_next().contains(&next)
    }
}

/// One row in the execution audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct StateEvent {
    pub ts: DateTime<Utc>,
    pub from_state: ExecState,
    pub to_state: ExecState,
    pub note: String,
    pub error: Option<String>,
}

/// Which venue a leg executed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Venue {
    Cex,
    Dex,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Cex => "cex",
            Venue::Dex => "dex",
        }
    }
}

/// Fill record for one leg.
#[derive(Debug, Clone, Serialize)]
pub struct LegFill {
    pub venue: Venue,
    pub side: crate::types::OrderSide,
    pub filled_qty: Decimal,
    pub avg_price: Decimal,
    pub venue_order_id: Option<String>,
    pub tx_hash: Option<String>,
    pub fees_paid_usd: Decimal,
    pub latency_ms: u64,
    pub attempts: u32,
}

/// Mutable record owned by the executor for one signal's lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub signal: Signal,
    pub state: ExecState,

    pub leg1: Option<LegFill>,
    pub leg2: Option<LegFill>,
    pub unwind: Option<LegFill>,

    pub events: Vec<StateEvent>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub actual_net_pnl_usd: Option<Decimal>,
    pub failure_reason: Option<String>,
    pub requires_manual_intervention: bool,
}

impl ExecutionContext {
    pub fn new(signal: Signal) -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            signal,
            state: ExecState::Idle,
            leg1: None,
            leg2: None,
            unwind: None,
            events: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            actual_net_pnl_usd: None,
            failure_reason: None,
            requires_manual_intervention: false,
        }
    }

    /// Move to `next` if the edge is in the transition table, appending an
    /// audit entry. A disallowed edge returns `InvalidStateTransition`.
    pub fn transition(&mut self, next: ExecState, note: &str) -> Result<(), BotError> {
        self.transition_with_error(next, note, None)
    }

    pub fn transition_with_error(
        &mut self,
        next: ExecState,
        note: &str,
        error: Option<String>,
    ) -> Result<(), BotError> {
        if !self.state.can_transition_to(next) {
            return Err(BotError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: format!("{:?}", next),
            });
        }
        self.events.push(StateEvent {
            ts: Utc::now(),
            from_state: self.state,
            to_state: next,
            note: note.to_string(),
            error,
        });
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|f| (f - self.started_at).num_milliseconds())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
