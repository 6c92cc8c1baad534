//! Failure classification for retry and breaker decisions

use serde::Serialize;

use super::AdapterError;

/// Broad failure bucket consumed by the retry loop and the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    Transient,
    Permanent,
    RateLimit,
    Network,
    Unknown,
}

impl FailureKind {
    /// Unknown is retried like Transient but still counts toward the breaker.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FailureKind::Transient | FailureKind::RateLimit | FailureKind::Network | FailureKind::Unknown
        )
    }
}

/// Ordered (fragment, kind) rules. First match wins; adapters that already
/// speak the taxonomy bypass the text rules entirely.
const PATTERNS: &[(&str, FailureKind)] = &[
    ("timeout", FailureKind::Transient),
    ("timed out", FailureKind::Transient),
    ("transient", FailureKind::Transient),
    ("temporarily", FailureKind::Transient),
    ("rate limit", FailureKind::RateLimit),
    ("rate-limit", FailureKind::RateLimit),
    ("429", FailureKind::RateLimit),
    ("too many requests", FailureKind::RateLimit),
    ("insufficient", FailureKind::Permanent),
    ("invalid", FailureKind::Permanent),
    ("revert", FailureKind::Permanent),
    ("nonce too low", FailureKind::Permanent),
    ("rejected", FailureKind::Permanent),
    ("connection refused", FailureKind::Network),
    ("connection reset", FailureKind::Network),
    ("dns", FailureKind::Network),
    ("network", FailureKind::Network),
];

pub struct FailureClassifier;

impl FailureClassifier {
    /// Adapter errors carry their kind directly.
    pub fn classify_adapter(error: &AdapterError) -> FailureKind {
        match error {
            AdapterError::Transient(_) => FailureKind::Transient,
            AdapterError::RateLimited(_) => FailureKind::RateLimit,
            AdapterError::Network(_) => FailureKind::Network,
            AdapterError::Permanent(_) => FailureKind::Permanent,
        }
    }

    /// Free-text classification for error strings that crossed a boundary
    /// without a kind (timeouts, serialized failures).
    pub fn classify_text(error: &str) -> FailureKind {
        let lower = error.to_lowercase();
        for (fragment, kind) in PATTERNS {
            if lower.contains(fragment) {
                return *kind;
            }
        }
        FailureKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_kinds_pass_through() {
        assert_eq!(
            FailureClassifier::classify_adapter(&AdapterError::RateLimited("429".into())),
            FailureKind::RateLimit
        );
        assert_eq!(
            FailureClassifier::classify_adapter(&AdapterError::Permanent("bad order".into())),
            FailureKind::Permanent
        );
    }

    #[test]
    fn test_text_patterns_first_match_wins() {
        assert_eq!(
            FailureClassifier::classify_text("request timed out after 5s"),
            FailureKind::Transient
        );
        assert_eq!(
            FailureClassifier::classify_text("HTTP 429 Too Many Requests"),
            FailureKind::RateLimit
        );
        assert_eq!(
            FailureClassifier::classify_text("execution reverted: K"),
            FailureKind::Permanent
        );
        assert_eq!(
            FailureClassifier::classify_text("connection reset by peer"),
            FailureKind::Network
        );
    }

    #[test]
    fn test_unknown_fallback_is_retriable() {
        let kind = FailureClassifier::classify_text("something inexplicable");
        assert_eq!(kind, FailureKind::Unknown);
        assert!(kind.is_retriable());
    }

    #[test]
    fn test_permanent_not_retriable() {
        assert!(!FailureKind::Permanent.is_retriable());
    }
}
