//! Deterministic simulated venue adapters
//!
//! Used as the execution backend in simulation mode and as the test doubles
//! everywhere. Behavior is scripted, never random: books and quotes are set
//! explicitly, orders fill after a configured number of polls, and failures
//! are queued per operation.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::errors::{AdapterError, AdapterResult};
use crate::types::{DexQuote, OrderBook, OrderSide, RouteTag, SwapReceipt, TradingPair};

use super::{CexAdapter, DexAdapter, OrderStatus};

struct SimOrder {
    side: OrderSide,
    price: Decimal,
    size: Decimal,
    polls_seen: u32,
    fills_after: Option<u32>,
    canceled: bool,
}

/// Scripted CEX double. Orders fill at their limit price after
/// `fill_after_polls` status polls; `None` leaves them resting forever,
/// which is how leg-timeout paths are exercised.
pub struct SimCexAdapter {
    books: RwLock<HashMap<String, OrderBook>>,
    balances: RwLock<HashMap<String, Decimal>>,
    orders: RwLock<HashMap<String, SimOrder>>,
    fill_after_polls: RwLock<Option<u32>>,
    /// Scripted per-call outcomes for `place`; None entries succeed
    fail_place: RwLock<VecDeque<Option<AdapterError>>>,
    fail_book: RwLock<VecDeque<Option<AdapterError>>>,
    next_order_id: AtomicU64,
}

impl SimCexAdapter {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            orders: RwLock::new(HashMap::new()),
            fill_after_polls: RwLock::new(Some(1)),
            fail_place: RwLock::new(VecDeque::new()),
            fail_book: RwLock::new(VecDeque::new()),
            next_order_id: AtomicU64::new(1),
        }
    }

    pub async fn set_book(&self, symbol: &str, book: OrderBook) {
        self.books.write().await.insert(symbol.to_string(), book);
    }

    pub async fn set_balance(&self, asset: &str, amount: Decimal) {
        self.balances.write().await.insert(asset.to_string(), amount);
    }

    /// `None` means orders never fill.
    pub async fn set_fill_after_polls(&self, polls: Option<u32>) {
        *self.fill_after_polls.write().await = polls;
    }

    pub async fn script_place_failure(&self, error: AdapterError) {
        self.fail_place.write().await.push_back(Some(error));
    }

    /// Let the next `place` call through; used to position later scripted
    /// failures.
    pub async fn script_place_ok(&self) {
        self.fail_place.write().await.push_back(None);
    }

    pub async fn script_book_failure(&self, error: AdapterError) {
        self.fail_book.write().await.push_back(Some(error));
    }
}

impl Default for SimCexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CexAdapter for SimCexAdapter {
    async fn fetch_order_book(&self, pair: &TradingPair, _depth: usize) -> AdapterResult<OrderBook> {
        if let Some(Some(err)) = self.fail_book.write().await.pop_front() {
            return Err(err);
        }
        self.books
            .read()
            .await
            .get(&pair.symbol)
            .cloned()
            .ok_or_else(|| AdapterError::Permanent(format!("no book for {}", pair.symbol)))
    }

    async fn place_limit_postonly(
        &self,
        _pair: &TradingPair,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
    ) -> AdapterResult<String> {
        if let Some(Some(err)) = self.fail_place.write().await.pop_front() {
            return Err(err);
        }
        let id = format!("cex-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let fills_after = *self.fill_after_polls.read().await;
        self.orders.write().await.insert(
            id.clone(),
            SimOrder {
                side,
                price,
                size,
                polls_seen: 0,
                fills_after,
                canceled: false,
            },
        );
        Ok(id)
    }

    async fn poll_order(&self, order_id: &str) -> AdapterResult<OrderStatus> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| AdapterError::Permanent(format!("unknown order {order_id}")))?;
        if order.canceled {
            return Ok(OrderStatus::Canceled);
        }
        order.polls_seen += 1;
        match order.fills_after {
            Some(n) if order.polls_seen >= n => Ok(OrderStatus::Filled {
                qty: order.size,
                avg_price: order.price,
            }),
            _ => Ok(OrderStatus::Open),
        }
    }

    async fn cancel(&self, order_id: &str) -> AdapterResult<()> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(order_id) {
            Some(order) => {
                order.canceled = true;
                Ok(())
            }
            None => Err(AdapterError::Permanent(format!("unknown order {order_id}"))),
        }
    }

    async fn fetch_balances(&self) -> AdapterResult<HashMap<String, Decimal>> {
        Ok(self.balances.read().await.clone())
    }
}

#[derive(Clone)]
struct SimPool {
    /// quote paid per base when buying base on the DEX
    buy_price: Decimal,
    /// quote received per base when selling base on the DEX
    sell_price: Decimal,
    base_token: String,
    quote_token: String,
    route: RouteTag,
    gas_estimate_units: u64,
}

/// Scripted DEX double. Register a pair with its buy/sell prices; quotes and
/// swaps derive deterministically from those.
pub struct SimDexAdapter {
    pools: RwLock<Vec<SimPool>>,
    /// Applied to swap output vs the quoted amount, in bps
    swap_slippage_bps: RwLock<Decimal>,
    gas_spent_usd: RwLock<Decimal>,
    fail_quote: RwLock<VecDeque<Option<AdapterError>>>,
    fail_swap: RwLock<VecDeque<Option<AdapterError>>>,
    next_tx: AtomicU64,
}

impl SimDexAdapter {
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(Vec::new()),
            swap_slippage_bps: RwLock::new(dec!(2)),
            gas_spent_usd: RwLock::new(dec!(0.02)),
            fail_quote: RwLock::new(VecDeque::new()),
            fail_swap: RwLock::new(VecDeque::new()),
            next_tx: AtomicU64::new(1),
        }
    }

    pub async fn register_pair(
        &self,
        pair: &TradingPair,
        buy_price: Decimal,
        sell_price: Decimal,
        route: RouteTag,
        gas_estimate_units: u64,
    ) {
        self.pools.write().await.push(SimPool {
            buy_price,
            sell_price,
            base_token: pair.token_address.clone(),
            quote_token: pair.quote_token_address.clone(),
            route,
            gas_estimate_units,
        });
    }

    pub async fn set_swap_slippage_bps(&self, bps: Decimal) {
        *self.swap_slippage_bps.write().await = bps;
    }

    pub async fn set_gas_spent_usd(&self, usd: Decimal) {
        *self.gas_spent_usd.write().await = usd;
    }

    pub async fn script_quote_failure(&self, error: AdapterError) {
        self.fail_quote.write().await.push_back(Some(error));
    }

    pub async fn script_swap_failure(&self, error: AdapterError) {
        self.fail_swap.write().await.push_back(Some(error));
    }

    /// Let the next `swap` call through; used to position later scripted
    /// failures.
    pub async fn script_swap_ok(&self) {
        self.fail_swap.write().await.push_back(None);
    }

    async fn find_pool(
        &self,
        token_in: &str,
        token_out: &str,
        route_hint: Option<&RouteTag>,
    ) -> Option<SimPool> {
        let pools = self.pools.read().await;
        pools
            .iter()
            .filter(|p| {
                (p.base_token == token_in && p.quote_token == token_out)
                    || (p.quote_token == token_in && p.base_token == token_out)
            })
            .find(|p| route_hint.map(|h| h == &p.route).unwrap_or(true))
            .or_else(|| {
                pools.iter().find(|p| {
                    (p.base_token == token_in && p.quote_token == token_out)
                        || (p.quote_token == token_in && p.base_token == token_out)
                })
            })
            .cloned()
    }
}

impl Default for SimDexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DexAdapter for SimDexAdapter {
    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        route_hint: Option<&RouteTag>,
    ) -> AdapterResult<DexQuote> {
        if let Some(Some(err)) = self.fail_quote.write().await.pop_front() {
            return Err(err);
        }
        let pool = self
            .find_pool(token_in, token_out, route_hint)
            .await
            .ok_or_else(|| AdapterError::Permanent(format!("no route {token_in}->{token_out}")))?;

        // Spending quote to receive base uses the buy price; the reverse
        // direction sells base at the sell price.
        let buying_base = token_in == pool.quote_token;
        let (amount_out, effective_price) = if buying_base {
            (amount_in / pool.buy_price, pool.buy_price)
        } else {
            (amount_in * pool.sell_price, pool.sell_price)
        };

        Ok(DexQuote {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            amount_out,
            gas_estimate_units: pool.gas_estimate_units,
            effective_price,
            route: pool.route.clone(),
            aggregator_fee_bps: match pool.route {
                RouteTag::Aggregator => 5,
                RouteTag::DirectPool { .. } => 0,
            },
            fetched_at: Utc::now(),
        })
    }

    async fn swap(
        &self,
        quote: &DexQuote,
        _deadline_seconds: u64,
        slippage_bps: u32,
        _sender: &str,
    ) -> AdapterResult<SwapReceipt> {
        if let Some(Some(err)) = self.fail_swap.write().await.pop_front() {
            return Err(err);
        }
        let sim_slip = *self.swap_slippage_bps.read().await;
        let effective_out = quote.amount_out * (dec!(10_000) - sim_slip) / dec!(10_000);
        let min_out = quote.amount_out * (dec!(10_000) - Decimal::from(slippage_bps)) / dec!(10_000);
        if effective_out < min_out {
            return Err(AdapterError::Permanent(
                "slippage exceeded: execution reverted".to_string(),
            ));
        }
        Ok(SwapReceipt {
            tx_hash: format!("0xsim{:016x}", self.next_tx.fetch_add(1, Ordering::SeqCst)),
            effective_out_amount: effective_out,
            gas_spent_usd: *self.gas_spent_usd.read().await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FeeTier, PriceLevel};

    fn pair() -> TradingPair {
        TradingPair {
            symbol: "ARB/USDT".to_string(),
            venue_symbol: "ARBUSDT".to_string(),
            token_address: "0xbase".to_string(),
            quote_token_address: "0xquote".to_string(),
            fee_tier: FeeTier::Medium,
            pool_address: None,
            min_size_base: dec!(1),
        }
    }

    #[tokio::test]
    async fn test_cex_order_lifecycle() {
        let cex = SimCexAdapter::new();
        cex.set_fill_after_polls(Some(2)).await;
        let id = cex
            .place_limit_postonly(&pair(), OrderSide::Sell, dec!(1.26), dec!(10))
            .await
            .unwrap();
        assert!(matches!(cex.poll_order(&id).await.unwrap(), OrderStatus::Open));
        match cex.poll_order(&id).await.unwrap() {
            OrderStatus::Filled { qty, avg_price } => {
                assert_eq!(qty, dec!(10));
                assert_eq!(avg_price, dec!(1.26));
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cex_cancel_sticks() {
        let cex = SimCexAdapter::new();
        let id = cex
            .place_limit_postonly(&pair(), OrderSide::Buy, dec!(1.25), dec!(5))
            .await
            .unwrap();
        cex.cancel(&id).await.unwrap();
        assert!(matches!(
            cex.poll_order(&id).await.unwrap(),
            OrderStatus::Canceled
        ));
    }

    #[tokio::test]
    async fn test_cex_scripted_failure_fires_once() {
        let cex = SimCexAdapter::new();
        cex.script_place_failure(AdapterError::RateLimited("429".into()))
            .await;
        let err = cex
            .place_limit_postonly(&pair(), OrderSide::Buy, dec!(1.25), dec!(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::RateLimited(_)));
        assert!(cex
            .place_limit_postonly(&pair(), OrderSide::Buy, dec!(1.25), dec!(5))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_cex_book_roundtrip() {
        let cex = SimCexAdapter::new();
        cex.set_book(
            "ARB/USDT",
            OrderBook {
                bids: vec![PriceLevel { price: dec!(1.25), size: dec!(100) }],
                asks: vec![PriceLevel { price: dec!(1.251), size: dec!(100) }],
            },
        )
        .await;
        let book = cex.fetch_order_book(&pair(), 10).await.unwrap();
        assert_eq!(book.best_bid().unwrap().price, dec!(1.25));
    }

    #[tokio::test]
    async fn test_dex_quote_both_directions() {
        let dex = SimDexAdapter::new();
        dex.register_pair(&pair(), dec!(1.2469), dec!(1.2431), RouteTag::Aggregator, 180_000)
            .await;

        // Spend 5 USDT to buy base
        let q = dex.quote("0xquote", "0xbase", dec!(5), None).await.unwrap();
        assert_eq!(q.effective_price, dec!(1.2469));
        assert!(q.amount_out > dec!(4));

        // Sell 4 base for quote
        let q = dex.quote("0xbase", "0xquote", dec!(4), None).await.unwrap();
        assert_eq!(q.effective_price, dec!(1.2431));
        assert_eq!(q.amount_out, dec!(4) * dec!(1.2431));
    }

    #[tokio::test]
    async fn test_dex_swap_respects_slippage_cap() {
        let dex = SimDexAdapter::new();
        dex.register_pair(&pair(), dec!(1.25), dec!(1.24), RouteTag::Aggregator, 180_000)
            .await;
        dex.set_swap_slippage_bps(dec!(80)).await;
        let q = dex.quote("0xquote", "0xbase", dec!(20), None).await.unwrap();
        // Caller tolerates 50 bps, sim slips 80 -> revert
        let err = dex.swap(&q, 120, 50, "0xsender").await.unwrap_err();
        assert!(matches!(err, AdapterError::Permanent(_)));
        // Tolerating 100 bps succeeds
        assert!(dex.swap(&q, 120, 100, "0xsender").await.is_ok());
    }
}
