//! Replay and staleness protection

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::ReplaySettings;
use crate::errors::{BotError, BotResult};
use crate::types::Signal;

const AUDIT_CAPACITY: usize = 500;

/// One row in the accept/reject audit ring.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayDecision {
    pub signal_id: String,
    pub pair: String,
    pub accepted: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReplayStats {
    pub tracked_ids: usize,
    pub accepted: u64,
    pub rejected: u64,
}

/// Bounded LRU of executed signal ids plus per-venue nonce high-water marks.
/// Guards against duplicate ids, stale signals, and out-of-order nonces.
pub struct ReplayLedger {
    config: ReplaySettings,
    seen: HashMap<String, Instant>,
    insertion_order: VecDeque<String>,
    nonce_high_water: HashMap<String, u64>,
    audit: VecDeque<ReplayDecision>,
    accepted: u64,
    rejected: u64,
}

impl ReplayLedger {
    pub fn new(config: ReplaySettings) -> Self {
        Self {
            config,
            seen: HashMap::new(),
            insertion_order: VecDeque::new(),
            nonce_high_water: HashMap::new(),
            audit: VecDeque::new(),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Admission check: staleness, dedup, nonce monotonicity. Every call is
    /// recorded in the audit ring.
    pub fn check(&mut self, signal: &Signal) -> BotResult<()> {
        self.cleanup();

        let age = signal.age_seconds();
        if age > self.config.max_age_seconds {
            let err = BotError::Stale {
                age_seconds: age,
                max_age_seconds: self.config.max_age_seconds,
            };
            self.log(signal, false, &err.to_string());
            return Err(err);
        }

        if self.seen.contains_key(&signal.signal_id) {
            let err = BotError::ReplayRejected {
                reason: format!("duplicate signal_id {}", signal.signal_id),
            };
            self.log(signal, false, "duplicate signal_id");
            return Err(err);
        }

        if self.config.nonce_check {
            if let Some(expected) = signal
                .meta
                .get("expected_nonce")
                .and_then(|v| v.parse::<u64>().ok())
            {
                let venue = signal
                    .meta
                    .get("nonce_venue")
                    .map(|s| s.as_str())
                    .unwrap_or("dex");
                let high_water = self.nonce_high_water.get(venue).copied().unwrap_or(0);
                if expected <= high_water {
                    let err = BotError::ReplayRejected {
                        reason: format!(
                            "nonce {expected} not above high-water {high_water} on {venue}"
                        ),
                    };
                    self.log(signal, false, "nonce below high-water");
                    return Err(err);
                }
            }
        }

        self.log(signal, true, "ok");
        Ok(())
    }

    /// Record that a signal reached the executor. From here on its id is a
    /// duplicate and its nonce raises the high-water mark.
    pub fn mark_executed(&mut self, signal: &Signal) {
        if self
            .seen
            .insert(signal.signal_id.clone(), Instant::now())
            .is_none()
        {
            self.insertion_order.push_back(signal.signal_id.clone());
        }
        if let Some(nonce) = signal
            .meta
            .get("expected_nonce")
            .and_then(|v| v.parse::<u64>().ok())
        {
            let venue = signal
                .meta
                .get("nonce_venue")
                .map(|s| s.as_str())
                .unwrap_or("dex");
            let entry = self.nonce_high_water.entry(venue.to_string()).or_insert(0);
            *entry = (*entry).max(nonce);
        }
        while self.seen.len() > self.config.lru_capacity {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.seen.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            tracked_ids: self.seen.len(),
            accepted: self.accepted,
            rejected: self.rejected,
        }
    }

    pub fn recent_decisions(&self, n: usize) -> Vec<ReplayDecision> {
        self.audit.iter().rev().take(n).cloned().collect()
    }

    fn cleanup(&mut self) {
        let ttl = Duration::from_secs_f64(self.config.ttl_seconds);
        while let Some(oldest) = self.insertion_order.front() {
            match self.seen.get(oldest) {
                Some(at) if at.elapsed() > ttl => {
                    let key = self.insertion_order.pop_front().expect("front exists");
                    self.seen.remove(&key);
                }
                Some(_) => break,
                None => {
                    self.insertion_order.pop_front();
                }
            }
        }
    }

    fn log(&mut self, signal: &Signal, accepted: bool, reason: &str) {
        if accepted {
            self.accepted += 1;
        } else {
            self.rejected += 1;
            debug!(signal_id = %signal.signal_id, reason, "replay reject");
        }
        self.audit.push_back(ReplayDecision {
            signal_id: signal.signal_id.clone(),
            pair: signal.pair.clone(),
            accepted,
            reason: reason.to_string(),
        });
        while self.audit.len() > AUDIT_CAPACITY {
            self.audit.pop_front();
        }
    }
}
