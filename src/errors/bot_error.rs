//! Custom error types for the bot

use thiserror::Error;

/// Errors surfaced by venue adapters. The core never sees transport details,
/// only this taxonomy.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("transient venue error: {0}")]
    Transient(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("permanent venue error: {0}")]
    Permanent(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("replay rejected: {reason}")]
    ReplayRejected { reason: String },

    #[error("signal stale: age {age_seconds:.1}s > max {max_age_seconds:.1}s")]
    Stale {
        age_seconds: f64,
        max_age_seconds: f64,
    },

    #[error("circuit breaker open ({scope})")]
    BreakerOpen { scope: String },

    #[error("safety violation: {rule}")]
    SafetyViolation { rule: String },

    #[error("insufficient balance: need {needed} {asset} on {venue}, have {available}")]
    InsufficientBalance {
        venue: String,
        asset: String,
        needed: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("unwind failed for {signal_id}: {detail}")]
    UnwindFailed { signal_id: String, detail: String },

    #[error("config error: {0}")]
    Config(String),
}

pub type BotResult<T> = Result<T, BotError>;
