//! Circuit breaker with per-pair isolation

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::BreakerSettings;
use crate::errors::FailureKind;
use crate::events::{BotEvent, EventBus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BreakerMode {
    Closed,
    Open,
    HalfOpen,
}

/// Read-only view for logging and session stats.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub scope: String,
    pub mode: BreakerMode,
    pub failures_in_window: usize,
    pub drawdown_usd: Decimal,
    pub cooldown_remaining_secs: f64,
}

struct SingleBreaker {
    config: BreakerSettings,
    scope: String,
    failures: VecDeque<Instant>,
    window_pnl: VecDeque<(Instant, Decimal)>,
    mode: BreakerMode,
    opened_at: Option<Instant>,
    half_open_at: Option<Instant>,
    probe_taken: bool,
}

impl SingleBreaker {
    fn new(config: BreakerSettings, scope: String) -> Self {
        Self {
            config,
            scope,
            failures: VecDeque::new(),
            window_pnl: VecDeque::new(),
            mode: BreakerMode::Closed,
            opened_at: None,
            half_open_at: None,
            probe_taken: false,
        }
    }

    fn prune(&mut self) {
        let cutoff = Instant::now() - Duration::from_secs_f64(self.config.window_seconds);
        while self.failures.front().map(|t| *t < cutoff).unwrap_or(false) {
            self.failures.pop_front();
        }
        while self
            .window_pnl
            .front()
            .map(|(t, _)| *t < cutoff)
            .unwrap_or(false)
        {
            self.window_pnl.pop_front();
        }
    }

    fn drawdown_usd(&self) -> Decimal {
        let pnl: Decimal = self.window_pnl.iter().map(|(_, p)| *p).sum();
        if pnl < dec!(0) {
            -pnl
        } else {
            dec!(0)
        }
    }

    /// Time-based transitions: OPEN -> HALF_OPEN once the cooldown has
    /// elapsed, and HALF_OPEN -> CLOSED after a further full cooldown with
    /// no probe outcome. The second edge keeps an idle pair from sitting in
    /// half-open forever when no new signal arrives to probe with.
    fn maybe_transition(&mut self, events: &EventBus) {
        let cooldown = Duration::from_secs_f64(self.config.cooldown_seconds);
        match self.mode {
            BreakerMode::Open => {
                if let Some(opened) = self.opened_at {
                    if opened.elapsed() >= cooldown * 2 {
                        // Long idle: the half-open window has also lapsed
                        self.reset(events);
                    } else if opened.elapsed() >= cooldown {
                        self.mode = BreakerMode::HalfOpen;
                        self.half_open_at = Some(Instant::now());
                        self.probe_taken = false;
                        info!(scope = %self.scope, "breaker entering half-open, one probe allowed");
                        events.emit(BotEvent::BreakerHalfOpen {
                            scope: self.scope.clone(),
                        });
                    }
                }
            }
            BreakerMode::HalfOpen => {
                if let Some(entered) = self.half_open_at {
                    if entered.elapsed() >= cooldown {
                        self.reset(events);
                    }
                }
            }
            BreakerMode::Closed => {}
        }
    }

    /// True when a trade may pass. In half-open exactly one probe passes
    /// until its outcome is recorded.
    fn try_admit(&mut self, events: &EventBus) -> bool {
        self.maybe_transition(events);
        match self.mode {
            BreakerMode::Closed => true,
            BreakerMode::Open => false,
            BreakerMode::HalfOpen => {
                if self.probe_taken {
                    false
                } else {
                    self.probe_taken = true;
                    true
                }
            }
        }
    }

    fn trip(&mut self, reason: &str, events: &EventBus) {
        if self.mode == BreakerMode::Open {
            return;
        }
        self.mode = BreakerMode::Open;
        self.opened_at = Some(Instant::now());
        self.half_open_at = None;
        self.probe_taken = false;
        warn!(scope = %self.scope, reason, "circuit breaker tripped");
        events.emit(BotEvent::BreakerTrip {
            scope: self.scope.clone(),
            reason: reason.to_string(),
        });
    }

    fn reset(&mut self, events: &EventBus) {
        self.mode = BreakerMode::Closed;
        self.opened_at = None;
        self.half_open_at = None;
        self.probe_taken = false;
        self.failures.clear();
        self.window_pnl.clear();
        info!(scope = %self.scope, "circuit breaker reset to closed");
        events.emit(BotEvent::BreakerReset {
            scope: self.scope.clone(),
        });
    }

    fn record_failure(&mut self, kind: FailureKind, pnl_usd: Decimal, events: &EventBus) {
        self.maybe_transition(events);
        let now = Instant::now();
        // Permanent failures weigh double in the window
        let weight = if kind == FailureKind::Permanent { 2 } else { 1 };
        for _ in 0..weight {
            self.failures.push_back(now);
        }
        self.window_pnl.push_back((now, pnl_usd));
        self.prune();

        if self.mode == BreakerMode::HalfOpen {
            self.trip("half-open probe failed", events);
            return;
        }
        if self.failures.len() >= self.config.failure_threshold {
            self.trip(
                &format!("{} failures in window", self.failures.len()),
                events,
            );
        } else if self.drawdown_usd() >= self.config.max_drawdown_usd {
            self.trip(
                &format!("drawdown ${} in window", self.drawdown_usd()),
                events,
            );
        }
    }

    fn record_success(&mut self, pnl_usd: Decimal, events: &EventBus) {
        self.maybe_transition(events);
        self.window_pnl.push_back((Instant::now(), pnl_usd));
        // Healthy streaks decay the failure count
        self.failures.pop_front();
        self.prune();
        if self.mode == BreakerMode::HalfOpen {
            self.reset(events);
        }
    }

    fn snapshot(&mut self, events: &EventBus) -> BreakerSnapshot {
        self.maybe_transition(events);
        self.prune();
        let remaining = match (self.mode, self.opened_at) {
            (BreakerMode::Open, Some(at)) => {
                (self.config.cooldown_seconds - at.elapsed().as_secs_f64()).max(0.0)
            }
            _ => 0.0,
        };
        BreakerSnapshot {
            scope: self.scope.clone(),
            mode: self.mode,
            failures_in_window: self.failures.len(),
            drawdown_usd: self.drawdown_usd(),
            cooldown_remaining_secs: remaining,
        }
    }
}

/// Global breaker plus one breaker per pair; admission requires both sides
/// to allow the trade, so a toxic pair halts alone while a systemic failure
/// halts everything.
pub struct CircuitBreaker {
    config: BreakerSettings,
    events: EventBus,
    global: SingleBreaker,
    per_pair: HashMap<String, SingleBreaker>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerSettings, events: EventBus) -> Self {
        Self {
            global: SingleBreaker::new(config.clone(), "global".to_string()),
            per_pair: HashMap::new(),
            config,
            events,
        }
    }

    fn pair_breaker(&mut self, pair: &str) -> &mut SingleBreaker {
        if !self.per_pair.contains_key(pair) {
            self.per_pair.insert(
                pair.to_string(),
                SingleBreaker::new(self.config.clone(), pair.to_string()),
            );
        }
        self.per_pair.get_mut(pair).expect("just inserted")
    }

    /// Both the global breaker and the pair breaker must admit. When the
    /// global side consumes a half-open probe slot but the pair side then
    /// refuses, the probe slot is intentionally burned; the next admission
    /// attempt re-opens it only after another outcome.
    pub fn try_admit(&mut self, pair: &str) -> bool {
        self.try_admit_scoped(pair).is_ok()
    }

    /// Like `try_admit`, reporting which scope refused.
    pub fn try_admit_scoped(&mut self, pair: &str) -> Result<(), String> {
        let events = self.events.clone();
        if !self.global.try_admit(&events) {
            return Err("global".to_string());
        }
        if !self.pair_breaker(pair).try_admit(&events) {
            return Err(pair.to_string());
        }
        Ok(())
    }

    pub fn record_failure(&mut self, pair: &str, kind: FailureKind, pnl_usd: Decimal) {
        let events = self.events.clone();
        self.global.record_failure(kind, pnl_usd, &events);
        self.pair_breaker(pair).record_failure(kind, pnl_usd, &events);
    }

    pub fn record_success(&mut self, pair: &str, pnl_usd: Decimal) {
        let events = self.events.clone();
        self.global.record_success(pnl_usd, &events);
        self.pair_breaker(pair).record_success(pnl_usd, &events);
    }

    /// Manual trip of one pair, used when an unwind fails and the position
    /// needs a human.
    pub fn trip_pair(&mut self, pair: &str, reason: &str) {
        let events = self.events.clone();
        self.pair_breaker(pair).trip(reason, &events);
    }

    pub fn is_open(&mut self, pair: &str) -> bool {
        let events = self.events.clone();
        self.global.maybe_transition(&events);
        if self.global.mode == BreakerMode::Open {
            return true;
        }
        let b = self.pair_breaker(pair);
        b.maybe_transition(&events);
        b.mode == BreakerMode::Open
    }

    pub fn global_snapshot(&mut self) -> BreakerSnapshot {
        let events = self.events.clone();
        self.global.snapshot(&events)
    }

    pub fn pair_snapshot(&mut self, pair: &str) -> BreakerSnapshot {
        let events = self.events.clone();
        self.pair_breaker(pair).snapshot(&events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(cooldown: f64) -> BreakerSettings {
        BreakerSettings {
            failure_threshold: 3,
            window_seconds: 60.0,
            cooldown_seconds: cooldown,
            max_drawdown_usd: dec!(10),
        }
    }

    fn breaker(cooldown: f64) -> CircuitBreaker {
        CircuitBreaker::new(settings(cooldown), EventBus::sink())
    }

    #[tokio::test]
    async fn test_trips_on_failure_threshold() {
        let mut cb = breaker(600.0);
        for _ in 0..2 {
            cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
            assert!(cb.try_admit("ARB/USDT"));
        }
        cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        assert!(!cb.try_admit("ARB/USDT"));
        assert!(cb.is_open("ARB/USDT"));
    }

    #[tokio::test]
    async fn test_permanent_failures_weigh_double() {
        let mut cb = breaker(600.0);
        cb.record_failure("ARB/USDT", FailureKind::Permanent, dec!(0));
        assert!(cb.try_admit("ARB/USDT"));
        cb.record_failure("ARB/USDT", FailureKind::Permanent, dec!(0));
        // 4 weighted failures >= threshold 3
        assert!(!cb.try_admit("ARB/USDT"));
    }

    #[tokio::test]
    async fn test_trips_on_drawdown() {
        let mut cb = breaker(600.0);
        cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(-6));
        cb.record_failure("OP/USDT", FailureKind::Transient, dec!(-5));
        // Global drawdown 11 >= 10
        assert!(!cb.try_admit("PEPE/USDT"));
    }

    #[tokio::test]
    async fn test_pair_isolation() {
        let mut cb = breaker(600.0);
        for _ in 0..3 {
            cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        }
        // Global also saw 3 failures, so everything is blocked; with a
        // higher threshold only the pair would trip. Check pair scoping via
        // snapshots instead.
        assert_eq!(cb.pair_snapshot("ARB/USDT").mode, BreakerMode::Open);
        assert_eq!(cb.pair_snapshot("OP/USDT").mode, BreakerMode::Closed);
    }

    #[tokio::test]
    async fn test_success_decays_failures() {
        let mut cb = breaker(600.0);
        cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        cb.record_success("ARB/USDT", dec!(0.1));
        cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        // 2 - 1 + 1 = 2 < threshold: still closed
        assert!(cb.try_admit("ARB/USDT"));
    }

    #[tokio::test]
    async fn test_half_open_probe_cycle() {
        let mut cb = breaker(0.05);
        for _ in 0..3 {
            cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        }
        assert!(!cb.try_admit("ARB/USDT"));

        std::thread::sleep(Duration::from_millis(80));
        // Cooldown elapsed: exactly one probe allowed
        assert!(cb.try_admit("ARB/USDT"));
        assert!(!cb.try_admit("ARB/USDT"));

        // Probe succeeds: breaker closes fully
        cb.record_success("ARB/USDT", dec!(0.1));
        assert!(cb.try_admit("ARB/USDT"));
        assert_eq!(cb.global_snapshot().mode, BreakerMode::Closed);
    }

    #[tokio::test]
    async fn test_half_open_probe_failure_reopens() {
        let mut cb = breaker(0.05);
        for _ in 0..3 {
            cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        }
        std::thread::sleep(Duration::from_millis(80));
        assert!(cb.try_admit("ARB/USDT"));
        cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(-0.1));
        // Back to open, cooldown restarted
        assert!(!cb.try_admit("ARB/USDT"));
        assert_eq!(cb.global_snapshot().mode, BreakerMode::Open);
    }

    #[tokio::test]
    async fn test_half_open_idle_resets_to_closed() {
        let mut cb = breaker(0.05);
        for _ in 0..3 {
            cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        }
        std::thread::sleep(Duration::from_millis(80));
        // Enter half-open and burn the probe slot without recording any
        // outcome for it
        assert!(cb.try_admit("ARB/USDT"));
        assert!(!cb.try_admit("ARB/USDT"));

        // A further full cooldown with no probe outcome closes the breaker
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cb.global_snapshot().mode, BreakerMode::Closed);
        assert!(cb.try_admit("ARB/USDT"));
    }

    #[tokio::test]
    async fn test_untouched_breaker_closes_after_double_cooldown() {
        let mut cb = breaker(0.05);
        for _ in 0..3 {
            cb.record_failure("ARB/USDT", FailureKind::Transient, dec!(0));
        }
        // Never probed at all: once both the open and half-open windows
        // have lapsed, the breaker is closed again
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(cb.global_snapshot().mode, BreakerMode::Closed);
        assert_eq!(cb.pair_snapshot("ARB/USDT").mode, BreakerMode::Closed);
    }

    #[tokio::test]
    async fn test_manual_pair_trip() {
        let mut cb = breaker(600.0);
        cb.trip_pair("ARB/USDT", "unwind failed");
        assert!(!cb.try_admit("ARB/USDT"));
        assert!(cb.try_admit("OP/USDT"));
    }
}
