//! CEX venue capability contract

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use crate::errors::AdapterResult;
use crate::types::{OrderBook, OrderSide, TradingPair};

/// Venue-side view of a resting order.
#[derive(Debug, Clone, Serialize)]
pub enum OrderStatus {
    Open,
    PartiallyFilled { qty: Decimal, avg_price: Decimal },
    Filled { qty: Decimal, avg_price: Decimal },
    Rejected { reason: String },
    Canceled,
}

/// Everything the core is allowed to ask of the centralized exchange.
/// Implementations own their transport, auth and rate limiting; the core
/// only sees the adapter error taxonomy.
#[async_trait]
pub trait CexAdapter: Send + Sync {
    async fn fetch_order_book(&self, pair: &TradingPair, depth: usize) -> AdapterResult<OrderBook>;

    /// Post-only limit order; rejected by the venue if it would take.
    async fn place_limit_postonly(
        &self,
        pair: &TradingPair,
        side: OrderSide,
        price: Decimal,
        size: Decimal,
    ) -> AdapterResult<String>;

    async fn poll_order(&self, order_id: &str) -> AdapterResult<OrderStatus>;

    async fn cancel(&self, order_id: &str) -> AdapterResult<()>;

    async fn fetch_balances(&self) -> AdapterResult<HashMap<String, Decimal>>;
}
