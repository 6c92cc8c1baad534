//! Simulated trading environment
//!
//! Wires the deterministic sim adapters with a plausible market around a
//! reference price per pair and seeds starting inventory, so the full
//! pipeline runs end to end with no venue credentials. This is the backend
//! behind `simulation_mode`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::adapters::{SimCexAdapter, SimDexAdapter};
use crate::capital::CapitalManager;
use crate::types::{FeeTier, OrderBook, PriceLevel, RouteTag, TradingPair, Venue};

/// Reference market used to seed one simulated pair.
#[derive(Debug, Clone)]
pub struct SimMarket {
    pub pair: TradingPair,
    pub mid_price: Decimal,
    /// Spread of the simulated CEX book around mid, in bps
    pub cex_spread_bps: Decimal,
    /// Discount of the DEX buy price vs mid, in bps; positive values create
    /// a BUY_DEX_SELL_CEX opportunity
    pub dex_discount_bps: Decimal,
    pub depth_base: Decimal,
}

pub struct SimulationEnv {
    pub cex: Arc<SimCexAdapter>,
    pub dex: Arc<SimDexAdapter>,
}

impl SimulationEnv {
    /// Build sim venues for `markets` and seed `capital` with two-sided
    /// inventory so both directions pass preflight.
    pub async fn bootstrap(
        markets: &[SimMarket],
        capital: &Arc<RwLock<CapitalManager>>,
    ) -> Self {
        let cex = Arc::new(SimCexAdapter::new());
        let dex = Arc::new(SimDexAdapter::new());

        for market in markets {
            let half_spread = market.mid_price * market.cex_spread_bps / dec!(20_000);
            cex.set_book(
                &market.pair.symbol,
                OrderBook {
                    bids: vec![
                        PriceLevel {
                            price: market.mid_price - half_spread,
                            size: market.depth_base,
                        },
                        PriceLevel {
                            price: market.mid_price - half_spread * dec!(3),
                            size: market.depth_base * dec!(4),
                        },
                    ],
                    asks: vec![
                        PriceLevel {
                            price: market.mid_price + half_spread,
                            size: market.depth_base,
                        },
                        PriceLevel {
                            price: market.mid_price + half_spread * dec!(3),
                            size: market.depth_base * dec!(4),
                        },
                    ],
                },
            )
            .await;

            let discount = market.mid_price * market.dex_discount_bps / dec!(10_000);
            let dex_buy = market.mid_price - discount;
            let dex_sell = dex_buy - market.mid_price * dec!(0.003);
            dex.register_pair(&market.pair, dex_buy, dex_sell, RouteTag::Aggregator, 220_000)
                .await;
            if let Some(pool) = &market.pair.pool_address {
                dex.register_pair(
                    &market.pair,
                    dex_buy,
                    dex_sell,
                    RouteTag::DirectPool {
                        pool: pool.clone(),
                        fee_tier: market.pair.fee_tier,
                    },
                    140_000,
                )
                .await;
            }

            let mut cm = capital.write().await;
            cm.mark_price(market.pair.base(), market.mid_price);
            let seed_base = market.depth_base.min(dec!(100));
            cm.deposit(Venue::Cex, market.pair.base(), seed_base);
            cm.deposit(Venue::Dex, market.pair.base(), seed_base);
        }

        Self { cex, dex }
    }
}

/// The default simulated universe: one liquid pair with a standing
/// dislocation wide enough to exercise the whole pipeline.
pub fn default_markets() -> Vec<SimMarket> {
    vec![SimMarket {
        pair: TradingPair {
            symbol: "ARB/USDT".to_string(),
            venue_symbol: "ARBUSDT".to_string(),
            token_address: "0x912ce59144191c1204e64559fe8253a0e49e6548".to_string(),
            quote_token_address: "0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9".to_string(),
            fee_tier: FeeTier::Medium,
            pool_address: Some("0xc6f780497a95e246eb9449f5e4770916dcd6396a".to_string()),
            min_size_base: dec!(1),
        },
        mid_price: dec!(1.2605),
        cex_spread_bps: dec!(8),
        dex_discount_bps: dec!(105),
        depth_base: dec!(500),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CexAdapter, DexAdapter};
    use crate::config::CapitalSettings;

    #[tokio::test]
    async fn test_bootstrap_seeds_market_and_inventory() {
        let capital = Arc::new(RwLock::new(CapitalManager::new(CapitalSettings {
            starting_cex_usd: dec!(100),
            starting_chain_usd: dec!(100),
            bridge_threshold_usd: dec!(20),
            bridge_fixed_cost_usd: dec!(0.05),
            amortization_target_trades: 20,
        })));
        let markets = default_markets();
        let env = SimulationEnv::bootstrap(&markets, &capital).await;

        let pair = &markets[0].pair;
        let book = env.cex.fetch_order_book(pair, 10).await.unwrap();
        assert!(book.is_well_formed());

        // DEX buy sits under the CEX bid, the configured dislocation
        let quote = env
            .dex
            .quote(&pair.quote_token_address, &pair.token_address, dec!(20), None)
            .await
            .unwrap();
        assert!(quote.effective_price < book.best_bid().unwrap().price);

        let cm = capital.read().await;
        assert!(cm.balance(Venue::Cex, "ARB") > dec!(0));
        assert!(cm.balance(Venue::Dex, "ARB") > dec!(0));
    }
}
