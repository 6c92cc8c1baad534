//! Route health tracking and selection

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};

use crate::types::RouteTag;

const WINDOW: usize = 50;
/// USD penalty applied at a 100% fill-failure rate
const FAIL_PENALTY_USD: Decimal = dec!(0.25);
/// Weight of the route's average gas spend in the penalty
const GAS_WEIGHT: Decimal = dec!(0.5);

#[derive(Debug, Default)]
struct RouteWindow {
    outcomes: VecDeque<bool>,
    gas_usd: VecDeque<Decimal>,
}

impl RouteWindow {
    fn push_outcome(&mut self, success: bool) {
        self.outcomes.push_back(success);
        while self.outcomes.len() > WINDOW {
            self.outcomes.pop_front();
        }
    }

    fn push_gas(&mut self, usd: Decimal) {
        self.gas_usd.push_back(usd);
        while self.gas_usd.len() > WINDOW {
            self.gas_usd.pop_front();
        }
    }

    fn failure_rate(&self) -> Decimal {
        if self.outcomes.is_empty() {
            return dec!(0);
        }
        let failures = self.outcomes.iter().filter(|s| !**s).count();
        Decimal::from(failures) / Decimal::from(self.outcomes.len())
    }

    fn avg_gas_usd(&self) -> Decimal {
        if self.gas_usd.is_empty() {
            return dec!(0);
        }
        let total: Decimal = self.gas_usd.iter().copied().sum();
        total / Decimal::from(self.gas_usd.len())
    }
}

/// Bounded moving windows of per-route fill outcomes and gas spend. The
/// generator records quoted gas at selection time; the executor records fill
/// outcomes and actual gas afterwards. Flaky or expensive routes get
/// penalized during selection.
#[derive(Debug, Default)]
pub struct RouteHealth {
    windows: HashMap<&'static str, RouteWindow>,
}

impl RouteHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&mut self, route: &RouteTag, success: bool) {
        self.windows.entry(route.label()).or_default().push_outcome(success);
    }

    pub fn record_gas(&mut self, route: &RouteTag, gas_usd: Decimal) {
        self.windows.entry(route.label()).or_default().push_gas(gas_usd);
    }

    /// USD haircut subtracted from a route's net profit during selection.
    pub fn unreliability_penalty_usd(&self, route: &RouteTag) -> Decimal {
        match self.windows.get(route.label()) {
            Some(w) => w.failure_rate() * FAIL_PENALTY_USD + w.avg_gas_usd() * GAS_WEIGHT,
            None => dec!(0),
        }
    }

    pub fn failure_rate(&self, route: &RouteTag) -> Decimal {
        self.windows
            .get(route.label())
            .map(|w| w.failure_rate())
            .unwrap_or_default()
    }
}

/// One route candidate during selection.
#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub route: RouteTag,
    pub net_pnl_usd: Decimal,
    pub gas_usd: Decimal,
}

/// Pick the candidate with the highest penalty-adjusted net profit; ties go
/// to the cheaper gas. Returns the winner and its margin over the best
/// alternative.
pub fn select_route(
    candidates: Vec<RouteCandidate>,
    health: &RouteHealth,
) -> Option<(RouteCandidate, Decimal)> {
    let mut scored: Vec<(Decimal, RouteCandidate)> = candidates
        .into_iter()
        .map(|c| {
            let score = c.net_pnl_usd - health.unreliability_penalty_usd(&c.route);
            (score, c)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.gas_usd.cmp(&b.1.gas_usd)));

    let mut iter = scored.into_iter();
    let (best_score, best) = iter.next()?;
    let margin = match iter.next() {
        Some((second_score, _)) => best_score - second_score,
        None => dec!(0),
    };
    Some((best, margin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeeTier;

    fn direct() -> RouteTag {
        RouteTag::DirectPool {
            pool: "0xpool".into(),
            fee_tier: FeeTier::Medium,
        }
    }

    #[test]
    fn test_clean_route_has_no_penalty() {
        let health = RouteHealth::new();
        assert_eq!(health.unreliability_penalty_usd(&RouteTag::Aggregator), dec!(0));
    }

    #[test]
    fn test_failures_raise_penalty() {
        let mut health = RouteHealth::new();
        for _ in 0..5 {
            health.record_outcome(&RouteTag::Aggregator, false);
            health.record_gas(&RouteTag::Aggregator, dec!(0.02));
        }
        // 100% failure rate: 0.25 + 0.02 * 0.5
        assert_eq!(
            health.unreliability_penalty_usd(&RouteTag::Aggregator),
            dec!(0.26)
        );
    }

    #[test]
    fn test_window_is_bounded() {
        let mut health = RouteHealth::new();
        for _ in 0..200 {
            health.record_outcome(&RouteTag::Aggregator, false);
        }
        for _ in 0..WINDOW {
            health.record_outcome(&RouteTag::Aggregator, true);
        }
        // Old failures fully aged out
        assert_eq!(health.failure_rate(&RouteTag::Aggregator), dec!(0));
    }

    #[test]
    fn test_selection_prefers_net_then_gas() {
        let health = RouteHealth::new();
        let (best, margin) = select_route(
            vec![
                RouteCandidate {
                    route: RouteTag::Aggregator,
                    net_pnl_usd: dec!(0.10),
                    gas_usd: dec!(0.03),
                },
                RouteCandidate {
                    route: direct(),
                    net_pnl_usd: dec!(0.10),
                    gas_usd: dec!(0.01),
                },
            ],
            &health,
        )
        .unwrap();
        assert_eq!(best.route, direct());
        assert_eq!(margin, dec!(0));
    }

    #[test]
    fn test_selection_penalizes_flaky_route() {
        let mut health = RouteHealth::new();
        for _ in 0..10 {
            health.record_outcome(&RouteTag::Aggregator, false);
            health.record_gas(&RouteTag::Aggregator, dec!(0.02));
        }
        let (best, margin) = select_route(
            vec![
                RouteCandidate {
                    route: RouteTag::Aggregator,
                    net_pnl_usd: dec!(0.15),
                    gas_usd: dec!(0.02),
                },
                RouteCandidate {
                    route: direct(),
                    net_pnl_usd: dec!(0.10),
                    gas_usd: dec!(0.01),
                },
            ],
            &health,
        )
        .unwrap();
        // 0.15 - 0.26 < 0.10, the direct pool wins despite lower raw net
        assert_eq!(best.route, direct());
        assert!(margin > dec!(0));
    }
}
