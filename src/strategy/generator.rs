//! Signal generation: detect dislocations, price both directions, gate, emit

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::adapters::{CexAdapter, DexAdapter};
use crate::capital::CapitalManager;
use crate::config::StrategyConfig;
use crate::events::{BotEvent, EventBus};
use crate::types::{
    BookFill, Direction, DexQuote, FeeBreakdown, FeeTier, OrderBook, OrderSide, RouteTag, Signal,
    TradingPair,
};

use super::fees::FeeModel;
use super::route::{select_route, RouteCandidate, RouteHealth};

/// One fully-priced route option, before selection.
struct Candidate {
    direction: Direction,
    gross_spread_bps: Decimal,
    cex_price: Decimal,
    dex_price: Decimal,
    quote: DexQuote,
    fees: FeeBreakdown,
    net_pnl_usd: Decimal,
}

/// Detects arbitrage opportunities for one tick. Fetches the CEX book and
/// DEX quotes, prices both directions on every available route, applies the
/// admission gates, and emits a Signal or nothing. Adapter failures never
/// escape: they degrade to `None` with a structured log line.
pub struct SignalGenerator {
    cex: Arc<dyn CexAdapter>,
    dex: Arc<dyn DexAdapter>,
    fees: FeeModel,
    strategy: StrategyConfig,
    capital: Arc<RwLock<CapitalManager>>,
    route_health: Arc<RwLock<RouteHealth>>,
    events: EventBus,
    last_signal_at: RwLock<HashMap<String, Instant>>,
}

impl SignalGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cex: Arc<dyn CexAdapter>,
        dex: Arc<dyn DexAdapter>,
        fees: FeeModel,
        strategy: StrategyConfig,
        capital: Arc<RwLock<CapitalManager>>,
        route_health: Arc<RwLock<RouteHealth>>,
        events: EventBus,
    ) -> Self {
        Self {
            cex,
            dex,
            fees,
            strategy,
            capital,
            route_health,
            events,
            last_signal_at: RwLock::new(HashMap::new()),
        }
    }

    pub async fn generate(&self, pair: &TradingPair) -> Option<Signal> {
        if self.in_cooldown(pair).await {
            debug!(pair = %pair.symbol, "skip: cooldown active");
            return None;
        }

        let book = match self.cex.fetch_order_book(pair, 20).await {
            Ok(book) => book,
            Err(e) => {
                warn!(pair = %pair.symbol, error = %e, "order book fetch failed");
                return None;
            }
        };
        if !book.is_well_formed() {
            warn!(pair = %pair.symbol, "skip: malformed order book");
            return None;
        }

        let best_bid = book.best_bid()?.price;
        let best_ask = book.best_ask()?.price;
        let mid = (best_bid + best_ask) / dec!(2);
        let size_quote = self.strategy.trade_size_usd;
        let size_base = size_quote / mid;
        if size_base < pair.min_size_base {
            debug!(pair = %pair.symbol, "skip: below min tradable size");
            return None;
        }

        // Keep the CEX price honest for the chosen size by walking the book
        // rather than reading top-of-book.
        let ask_fill = self.book_fill(&book, OrderSide::Buy, size_base, pair)?;
        let bid_fill = self.book_fill(&book, OrderSide::Sell, size_base, pair)?;

        let direct_hint = pair.pool_address.as_ref().map(|pool| RouteTag::DirectPool {
            pool: pool.clone(),
            fee_tier: pair.fee_tier,
        });

        // Aggregator quotes both ways, plus direct-pool quotes when the pair
        // carries a pool hint. All fetched concurrently.
        let (agg_buy, agg_sell, direct_buy, direct_sell) = tokio::join!(
            self.quote_logged(pair, size_quote, OrderSide::Buy, Some(&RouteTag::Aggregator)),
            self.quote_logged(pair, size_base, OrderSide::Sell, Some(&RouteTag::Aggregator)),
            self.quote_optional(pair, size_quote, OrderSide::Buy, direct_hint.as_ref()),
            self.quote_optional(pair, size_base, OrderSide::Sell, direct_hint.as_ref()),
        );

        let bridge_usd = self.capital.read().await.effective_bridge_cost();

        let mut candidates = Vec::new();
        if let (Some(buy), Some(sell)) = (agg_buy, agg_sell) {
            if let Some(c) = self.price_route(pair, buy, sell, &ask_fill, &bid_fill, size_quote, bridge_usd) {
                candidates.push(c);
            }
        }
        if let (Some(buy), Some(sell)) = (direct_buy, direct_sell) {
            if let Some(c) = self.price_route(pair, buy, sell, &ask_fill, &bid_fill, size_quote, bridge_usd) {
                candidates.push(c);
            }
        }
        if candidates.is_empty() {
            debug!(pair = %pair.symbol, "skip: no usable route quotes");
            return None;
        }

        let (winner, margin) = {
            let health = self.route_health.read().await;
            let route_candidates = candidates
                .iter()
                .map(|c| RouteCandidate {
                    route: c.quote.route.clone(),
                    net_pnl_usd: c.net_pnl_usd,
                    gas_usd: c.fees.gas_usd,
                })
                .collect();
            let (selected, margin) = select_route(route_candidates, &health)?;
            let idx = candidates
                .iter()
                .position(|c| c.quote.route == selected.route)?;
            (candidates.swap_remove(idx), margin)
        };

        self.route_health
            .write()
            .await
            .record_gas(&winner.quote.route, winner.fees.gas_usd);

        // ── gates ──
        let floor = self
            .strategy
            .min_spread_bps
            .max(self.tier_floor(pair.fee_tier));
        if winner.gross_spread_bps < Decimal::from(floor) {
            debug!(
                pair = %pair.symbol,
                spread = %winner.gross_spread_bps,
                floor,
                "skip: spread below tier floor"
            );
            return None;
        }
        if winner.net_pnl_usd < self.strategy.min_profit_usd {
            debug!(
                pair = %pair.symbol,
                net = %winner.net_pnl_usd,
                min = %self.strategy.min_profit_usd,
                "skip: net profit below minimum"
            );
            return None;
        }
        if size_quote > self.strategy.max_position_usd {
            debug!(pair = %pair.symbol, "skip: position limit");
            return None;
        }
        if let Err(e) = self
            .capital
            .read()
            .await
            .can_execute(pair, winner.direction, size_base, size_quote)
        {
            debug!(pair = %pair.symbol, error = %e, "skip: balance preflight failed");
            return None;
        }

        let created = chrono::Utc::now();
        let mut meta = HashMap::new();
        meta.insert("cex_bid".to_string(), best_bid.to_string());
        meta.insert("cex_ask".to_string(), best_ask.to_string());
        meta.insert(
            "cex_top_depth_quote".to_string(),
            book.top_depth_quote().to_string(),
        );
        meta.insert("route".to_string(), winner.quote.route.label().to_string());
        meta.insert(
            "gas_estimate_units".to_string(),
            winner.quote.gas_estimate_units.to_string(),
        );

        let signal = Signal {
            signal_id: Signal::make_id(
                &pair.symbol,
                winner.direction,
                created.timestamp_nanos_opt().unwrap_or_default(),
            ),
            pair: pair.symbol.clone(),
            direction: winner.direction,
            size_base,
            size_quote,
            cex_side_price: winner.cex_price,
            dex_side_price: winner.dex_price,
            gross_spread_bps: winner.gross_spread_bps,
            expected_net_pnl_usd: winner.net_pnl_usd,
            breakeven_bps: winner.fees.breakeven_bps(size_quote),
            fees: winner.fees,
            route: winner.quote.route.clone(),
            route_score_margin: margin,
            score: 0.0,
            score_breakdown: None,
            created_at: created,
            expires_at: created
                + chrono::Duration::milliseconds((self.strategy.signal_ttl_seconds * 1_000.0) as i64),
            meta,
        };

        self.last_signal_at
            .write()
            .await
            .insert(pair.symbol.clone(), Instant::now());
        self.events.emit(BotEvent::SignalGenerated {
            signal_id: signal.signal_id.clone(),
            pair: signal.pair.clone(),
            gross_spread_bps: signal.gross_spread_bps,
            net_pnl_usd: signal.expected_net_pnl_usd,
        });
        Some(signal)
    }

    // ── helpers ──

    async fn in_cooldown(&self, pair: &TradingPair) -> bool {
        let last = self.last_signal_at.read().await;
        match last.get(&pair.symbol) {
            Some(at) => at.elapsed().as_secs_f64() < self.strategy.cooldown_seconds,
            None => false,
        }
    }

    fn tier_floor(&self, tier: FeeTier) -> u32 {
        match tier {
            FeeTier::Low => self.strategy.tier_min_spread_bps.0,
            FeeTier::Medium => self.strategy.tier_min_spread_bps.1,
            FeeTier::High => self.strategy.tier_min_spread_bps.2,
        }
    }

    fn book_fill(
        &self,
        book: &OrderBook,
        side: OrderSide,
        size_base: Decimal,
        pair: &TradingPair,
    ) -> Option<BookFill> {
        match book.vwap_fill_price(side, size_base) {
            Some(fill) if fill.available >= size_base => Some(fill),
            Some(_) => {
                debug!(pair = %pair.symbol, side = ?side, "skip: book too thin for size");
                None
            }
            None => None,
        }
    }

    async fn quote_logged(
        &self,
        pair: &TradingPair,
        amount_in: Decimal,
        side: OrderSide,
        hint: Option<&RouteTag>,
    ) -> Option<DexQuote> {
        // Buying base spends the quote token; selling base spends base.
        let (token_in, token_out) = match side {
            OrderSide::Buy => (&pair.quote_token_address, &pair.token_address),
            OrderSide::Sell => (&pair.token_address, &pair.quote_token_address),
        };
        match self.dex.quote(token_in, token_out, amount_in, hint).await {
            Ok(q) => Some(q),
            Err(e) => {
                warn!(pair = %pair.symbol, side = ?side, error = %e, "dex quote failed");
                None
            }
        }
    }

    async fn quote_optional(
        &self,
        pair: &TradingPair,
        amount_in: Decimal,
        side: OrderSide,
        hint: Option<&RouteTag>,
    ) -> Option<DexQuote> {
        match hint {
            Some(hint) => self.quote_logged(pair, amount_in, side, Some(hint)).await,
            None => None,
        }
    }

    /// Price both directions on one route and keep the wider spread.
    #[allow(clippy::too_many_arguments)]
    fn price_route(
        &self,
        pair: &TradingPair,
        buy_quote: DexQuote,
        sell_quote: DexQuote,
        ask_fill: &BookFill,
        bid_fill: &BookFill,
        size_quote: Decimal,
        bridge_usd: Decimal,
    ) -> Option<Candidate> {
        let dex_buy = buy_quote.effective_price;
        let dex_sell = sell_quote.effective_price;
        if dex_buy <= dec!(0) || dex_sell <= dec!(0) {
            return None;
        }
        // Quotes older than the signal TTL would expire before execution
        if buy_quote.age_seconds() > self.strategy.signal_ttl_seconds
            || sell_quote.age_seconds() > self.strategy.signal_ttl_seconds
        {
            debug!(pair = %pair.symbol, "skip: stale dex quote");
            return None;
        }

        // A: buy at the CEX ask, sell into the DEX
        let spread_a = (dex_sell - ask_fill.avg_price) / ask_fill.avg_price * dec!(10_000);
        // B: buy from the DEX, sell at the CEX bid
        let spread_b = (bid_fill.avg_price - dex_buy) / dex_buy * dec!(10_000);

        let (direction, gross, cex_price, dex_price, quote) = if spread_a >= spread_b {
            (Direction::BuyCexSellDex, spread_a, ask_fill.avg_price, dex_sell, sell_quote)
        } else {
            (Direction::BuyDexSellCex, spread_b, bid_fill.avg_price, dex_buy, buy_quote)
        };

        let fees = self.fees.breakdown(&quote, pair.fee_tier, bridge_usd);
        let net_pnl_usd = fees.net_pnl_usd(size_quote, gross);
        Some(Candidate {
            direction,
            gross_spread_bps: gross,
            cex_price,
            dex_price,
            quote,
            fees,
            net_pnl_usd,
        })
    }
}
