//! One-way event bus for structured bot events
//!
//! Components emit; the orchestrator owns the single receiver and fans out
//! to logging and persistence. Nothing ever calls back through the bus, so
//! there are no cycles between the executor and the recovery plane.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BotEvent {
    SignalGenerated { signal_id: String, pair: String, gross_spread_bps: Decimal, net_pnl_usd: Decimal },
    SignalScored { signal_id: String, score: f64 },
    SignalQueued { signal_id: String, pair: String },
    SignalDropped { signal_id: String, reason: String },
    ExecutionStarted { signal_id: String, execution_id: String },
    StateTransition { signal_id: String, from: String, to: String },
    LegSubmitted { signal_id: String, leg: u8, venue: String },
    LegFilled { signal_id: String, leg: u8, venue: String, qty: Decimal, price: Decimal },
    LegFailed { signal_id: String, leg: u8, kind: String },
    UnwindStarted { signal_id: String, venue: String },
    ExecutionDone { signal_id: String, pnl_usd: Decimal },
    ExecutionFailed { signal_id: String, reason: String },
    BreakerTrip { scope: String, reason: String },
    BreakerHalfOpen { scope: String },
    BreakerReset { scope: String },
    SafetyViolation { rule: String, detail: String },
    KillSwitchActive,
    KillSwitchCleared,
    BridgeRecommended { accumulated_usd: Decimal },
}

/// Timestamped envelope as persisted/logged.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: BotEvent,
}

/// Cheap-to-clone sender half. Emission never blocks and never fails the
/// caller; a closed channel only logs.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<EventRecord>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Bus whose events go nowhere. Handy in tests that don't assert on
    /// events.
    pub fn sink() -> Self {
        let (bus, mut rx) = Self::new();
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        bus
    }

    pub fn emit(&self, event: BotEvent) {
        let record = EventRecord {
            ts: Utc::now(),
            event,
        };
        if self.tx.send(record).is_err() {
            warn!("event bus receiver dropped; event lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (bus, mut rx) = EventBus::new();
        bus.emit(BotEvent::SignalQueued {
            signal_id: "s1".into(),
            pair: "ARB/USDT".into(),
        });
        bus.emit(BotEvent::ExecutionDone {
            signal_id: "s1".into(),
            pnl_usd: dec!(0.12),
        });
        assert!(matches!(rx.recv().await.unwrap().event, BotEvent::SignalQueued { .. }));
        assert!(matches!(rx.recv().await.unwrap().event, BotEvent::ExecutionDone { .. }));
    }

    #[tokio::test]
    async fn test_emit_survives_dropped_receiver() {
        let (bus, rx) = EventBus::new();
        drop(rx);
        bus.emit(BotEvent::KillSwitchActive);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let record = EventRecord {
            ts: Utc::now(),
            event: BotEvent::BreakerTrip {
                scope: "ARB/USDT".into(),
                reason: "3 failures in window".into(),
            },
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"event\":\"breaker_trip\""));
        assert!(json.contains("ARB/USDT"));
    }
}
