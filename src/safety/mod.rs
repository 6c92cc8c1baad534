//! Absolute, non-configurable safety limits and the kill switch
//!
//! These constants are intentionally hard-coded. They are not read from the
//! environment or any config file, and they run AFTER every other admission
//! check.

use lazy_static::lazy_static;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;

/// Hard ceiling on any single trade
pub const ABSOLUTE_MAX_TRADE_USD: Decimal = dec!(25);
/// Hard ceiling on loss within a rolling day
pub const ABSOLUTE_MAX_DAILY_LOSS: Decimal = dec!(20);
/// Auto-stop if total capital drops below this
pub const ABSOLUTE_MIN_CAPITAL: Decimal = dec!(50);
/// Prevent runaway loops
pub const ABSOLUTE_MAX_TRADES_PER_HOUR: u32 = 30;

lazy_static! {
    /// Sentinel file shared across bot processes. Existence pauses admission.
    pub static ref KILL_SWITCH_FILE: PathBuf = std::env::temp_dir().join("arb_bot_kill");
}

/// Outcome of the final safety gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Ok,
    Blocked { rule: &'static str, detail: String },
}

impl SafetyVerdict {
    pub fn is_ok(&self) -> bool {
        matches!(self, SafetyVerdict::Ok)
    }
}

/// Final absolute-limits check. `daily_pnl_usd` is the signed realized P&L
/// over the trailing 24h (losses negative).
pub fn safety_check(
    trade_usd: Decimal,
    daily_pnl_usd: Decimal,
    total_capital_usd: Decimal,
    trades_this_hour: u32,
) -> SafetyVerdict {
    if trade_usd > ABSOLUTE_MAX_TRADE_USD {
        return SafetyVerdict::Blocked {
            rule: "max_trade_usd",
            detail: format!("trade ${trade_usd} exceeds absolute max ${ABSOLUTE_MAX_TRADE_USD}"),
        };
    }
    if daily_pnl_usd <= -ABSOLUTE_MAX_DAILY_LOSS {
        return SafetyVerdict::Blocked {
            rule: "max_daily_loss",
            detail: format!("daily loss ${} at absolute limit", -daily_pnl_usd),
        };
    }
    if total_capital_usd < ABSOLUTE_MIN_CAPITAL {
        return SafetyVerdict::Blocked {
            rule: "min_capital",
            detail: format!("capital ${total_capital_usd} below minimum ${ABSOLUTE_MIN_CAPITAL}"),
        };
    }
    if trades_this_hour >= ABSOLUTE_MAX_TRADES_PER_HOUR {
        return SafetyVerdict::Blocked {
            rule: "max_trades_per_hour",
            detail: format!("{trades_this_hour} trades this hour at absolute limit"),
        };
    }
    SafetyVerdict::Ok
}

/// True while the sentinel file exists.
pub fn is_kill_switch_active() -> bool {
    KILL_SWITCH_FILE.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_trade_blocked() {
        let verdict = safety_check(dec!(30), dec!(0), dec!(100), 0);
        match verdict {
            SafetyVerdict::Blocked { rule, .. } => assert_eq!(rule, "max_trade_usd"),
            SafetyVerdict::Ok => panic!("expected block"),
        }
    }

    #[test]
    fn test_daily_loss_limit() {
        assert!(safety_check(dec!(10), dec!(-19.99), dec!(100), 0).is_ok());
        assert!(!safety_check(dec!(10), dec!(-20), dec!(100), 0).is_ok());
    }

    #[test]
    fn test_capital_floor() {
        assert!(!safety_check(dec!(10), dec!(0), dec!(49.99), 0).is_ok());
        assert!(safety_check(dec!(10), dec!(0), dec!(50), 0).is_ok());
    }

    #[test]
    fn test_hourly_trade_cap() {
        assert!(safety_check(dec!(10), dec!(0), dec!(100), 29).is_ok());
        assert!(!safety_check(dec!(10), dec!(0), dec!(100), 30).is_ok());
    }

    #[test]
    fn test_passes_at_boundaries() {
        assert!(safety_check(ABSOLUTE_MAX_TRADE_USD, dec!(0), dec!(100), 0).is_ok());
    }
}
