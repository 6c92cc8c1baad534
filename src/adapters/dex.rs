//! DEX venue capability contract

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::AdapterResult;
use crate::types::{DexQuote, RouteTag, SwapReceipt};

/// Everything the core is allowed to ask of the on-chain side. Quotes come
/// from an aggregator or a direct pool evaluator; swaps go through whatever
/// signer/RPC stack the implementation wraps.
#[async_trait]
pub trait DexAdapter: Send + Sync {
    async fn quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        route_hint: Option<&RouteTag>,
    ) -> AdapterResult<DexQuote>;

    async fn swap(
        &self,
        quote: &DexQuote,
        deadline_seconds: u64,
        slippage_bps: u32,
        sender: &str,
    ) -> AdapterResult<SwapReceipt>;
}
