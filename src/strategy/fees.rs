//! Fee and cost model

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{DexQuote, FeeBreakdown, FeeTier};

/// Builds the full cost breakdown for a candidate trade. Gas converts from
/// estimated units through the current gas price and native-token price.
#[derive(Debug, Clone)]
pub struct FeeModel {
    pub cex_maker_fee_bps: u32,
    pub slippage_buffer_bps: u32,
    pub gas_price_gwei: Decimal,
    pub native_token_usd: Decimal,
}

impl FeeModel {
    pub fn gas_usd(&self, gas_units: u64) -> Decimal {
        // units * gwei -> native token (1e9 gwei per token), then to USD
        Decimal::from(gas_units) * self.gas_price_gwei / dec!(1_000_000_000) * self.native_token_usd
    }

    pub fn breakdown(
        &self,
        quote: &DexQuote,
        fee_tier: FeeTier,
        bridge_amortized_usd: Decimal,
    ) -> FeeBreakdown {
        FeeBreakdown {
            cex_fee_bps: self.cex_maker_fee_bps,
            dex_lp_fee_bps: fee_tier.lp_fee_bps(),
            aggregator_fee_bps: quote.aggregator_fee_bps,
            slippage_buffer_bps: self.slippage_buffer_bps,
            gas_usd: self.gas_usd(quote.gas_estimate_units),
            bridge_amortized_usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RouteTag;
    use chrono::Utc;

    fn model() -> FeeModel {
        FeeModel {
            cex_maker_fee_bps: 0,
            slippage_buffer_bps: 10,
            gas_price_gwei: dec!(0.01),
            native_token_usd: dec!(3000),
        }
    }

    #[test]
    fn test_gas_conversion() {
        // 180k units at 0.01 gwei on a $3000 native token
        // = 180_000 * 0.01 / 1e9 * 3000 = $0.0054
        assert_eq!(model().gas_usd(180_000), dec!(0.0054));
    }

    #[test]
    fn test_breakdown_totals() {
        let quote = DexQuote {
            token_in: "0xquote".into(),
            token_out: "0xbase".into(),
            amount_in: dec!(20),
            amount_out: dec!(16),
            gas_estimate_units: 180_000,
            effective_price: dec!(1.25),
            route: RouteTag::Aggregator,
            aggregator_fee_bps: 5,
            fetched_at: Utc::now(),
        };
        let bd = model().breakdown(&quote, FeeTier::Medium, dec!(0.01));
        assert_eq!(bd.total_fee_bps(), 0 + 30 + 5 + 10);
        assert_eq!(bd.bridge_amortized_usd, dec!(0.01));
        assert!(bd.gas_usd > dec!(0));
    }
}
