//! Bounded priority queue over pending signals

use serde::Serialize;
use std::collections::HashSet;

use crate::config::QueueSettings;
use crate::types::Signal;

use super::scorer::freshness_factor;

/// Why a push did not enqueue (or what it displaced).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the lowest-scored entry
    QueuedEvicted { dropped_id: String },
    Duplicate,
    PerPairCapped,
    BelowMinScore,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub total_pushed: u64,
    pub total_dropped: u64,
    pub total_yielded: u64,
    pub queued: usize,
}

/// Max-score-first queue with a global depth bound, a per-pair bound, and
/// signal-id dedup. Scores decay exponentially with the configured half
/// life; drain re-evaluates each candidate and drops expired or decayed-out
/// entries instead of yielding them.
pub struct SignalQueue {
    config: QueueSettings,
    entries: Vec<Signal>,
    ids: HashSet<String>,
    stats: QueueStats,
}

impl SignalQueue {
    pub fn new(config: QueueSettings) -> Self {
        Self {
            config,
            entries: Vec::new(),
            ids: HashSet::new(),
            stats: QueueStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.entries.len(),
            ..self.stats
        }
    }

    /// Decayed score as of now.
    pub fn effective_score(&self, signal: &Signal) -> f64 {
        let half_life = self.config.decay_half_life_seconds;
        if half_life <= 0.0 {
            return signal.score;
        }
        signal.score * 0.5_f64.powf(signal.age_seconds() / half_life)
    }

    pub fn push(&mut self, signal: Signal) -> PushOutcome {
        self.stats.total_pushed += 1;

        if self.ids.contains(&signal.signal_id) {
            self.stats.total_dropped += 1;
            return PushOutcome::Duplicate;
        }
        if signal.score < self.config.min_score {
            self.stats.total_dropped += 1;
            return PushOutcome::BelowMinScore;
        }
        let pair_count = self.entries.iter().filter(|s| s.pair == signal.pair).count();
        if pair_count >= self.config.max_per_pair {
            self.stats.total_dropped += 1;
            return PushOutcome::PerPairCapped;
        }

        let mut evicted = None;
        if self.entries.len() >= self.config.max_depth {
            // Evict the lowest-scored entry to make room; refuse the push
            // entirely if the newcomer is the weakest.
            let (idx, _) = match self
                .entries
                .iter()
                .enumerate()
                .min_by(|a, b| self.effective_score(a.1).total_cmp(&self.effective_score(b.1)))
            {
                Some(min) => min,
                None => return PushOutcome::BelowMinScore,
            };
            if self.effective_score(&self.entries[idx]) >= self.effective_score(&signal) {
                self.stats.total_dropped += 1;
                return PushOutcome::BelowMinScore;
            }
            let dropped = self.entries.remove(idx);
            self.ids.remove(&dropped.signal_id);
            self.stats.total_dropped += 1;
            evicted = Some(dropped.signal_id);
        }

        self.ids.insert(signal.signal_id.clone());
        self.entries.push(signal);

        match evicted {
            Some(dropped_id) => PushOutcome::QueuedEvicted { dropped_id },
            None => PushOutcome::Queued,
        }
    }

    /// Yield the best remaining signal, re-checking decay, freshness and
    /// expiry at yield time. Entries that no longer qualify are dropped
    /// silently into the stats.
    pub fn pop_best(&mut self) -> Option<Signal> {
        while !self.entries.is_empty() {
            let (idx, _) = self
                .entries
                .iter()
                .enumerate()
                .max_by(|a, b| self.effective_score(a.1).total_cmp(&self.effective_score(b.1)))?;
            let signal = self.entries.remove(idx);
            self.ids.remove(&signal.signal_id);

            if signal.is_expired()
                || freshness_factor(signal.age_seconds(), signal.ttl_seconds()) <= 0.0
            {
                self.stats.total_dropped += 1;
                continue;
            }
            if self.effective_score(&signal) < self.config.min_score {
                self.stats.total_dropped += 1;
                continue;
            }
            self.stats.total_yielded += 1;
            return Some(signal);
        }
        None
    }

    /// Drain everything that still qualifies, in descending score.
    pub fn drain(&mut self) -> Vec<Signal> {
        let mut out = Vec::new();
        while let Some(signal) = self.pop_best() {
            out.push(signal);
        }
        out
    }

    pub fn peek(&self) -> Option<&Signal> {
        self.entries
            .iter()
            .max_by(|a, b| self.effective_score(a).total_cmp(&self.effective_score(b)))
    }

    pub fn clear(&mut self) {
        self.stats.total_dropped += self.entries.len() as u64;
        self.entries.clear();
        self.ids.clear();
    }
}
