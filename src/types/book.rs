//! Order book types and depth walking

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Snapshot of the CEX book: bids descending, asks ascending.
#[derive(Debug, Clone, Serialize)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Result of walking one side of the book for a target size.
#[derive(Debug, Clone, Copy)]
pub struct BookFill {
    /// Size-weighted average fill price
    pub avg_price: Decimal,
    /// How much of the requested size the book can absorb
    pub available: Decimal,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Best bid must sit strictly below best ask and both sides must be
    /// price-monotonic. Violations indicate a corrupt snapshot.
    pub fn is_well_formed(&self) -> bool {
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price >= ask.price {
                return false;
            }
        } else {
            return false;
        }
        self.bids.windows(2).all(|w| w[0].price >= w[1].price)
            && self.asks.windows(2).all(|w| w[0].price <= w[1].price)
    }

    /// Walk the book for `size` base units and return the weighted average
    /// price a market-style fill would achieve. Buy walks asks, sell walks
    /// bids. Returns None on an empty side or non-positive size.
    pub fn vwap_fill_price(&self, side: OrderSide, size: Decimal) -> Option<BookFill> {
        if size <= dec!(0) {
            return None;
        }
        let levels = match side {
            OrderSide::Buy => &self.asks,
            OrderSide::Sell => &self.bids,
        };
        if levels.is_empty() {
            return None;
        }

        let mut remaining = size;
        let mut notional = dec!(0);
        for level in levels {
            let take = level.size.min(remaining);
            notional += take * level.price;
            remaining -= take;
            if remaining <= dec!(0) {
                break;
            }
        }
        let filled = size - remaining.max(dec!(0));
        if filled <= dec!(0) {
            return None;
        }
        Some(BookFill {
            avg_price: notional / filled,
            available: filled,
        })
    }

    /// USD depth available at top-of-book on the thinner side. Used by the
    /// scorer's liquidity factor.
    pub fn top_depth_quote(&self) -> Decimal {
        let bid = self
            .best_bid()
            .map(|l| l.price * l.size)
            .unwrap_or_default();
        let ask = self
            .best_ask()
            .map(|l| l.price * l.size)
            .unwrap_or_default();
        bid.min(ask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        OrderBook {
            bids: vec![
                PriceLevel { price: dec!(1.25), size: dec!(100) },
                PriceLevel { price: dec!(1.24), size: dec!(200) },
            ],
            asks: vec![
                PriceLevel { price: dec!(1.251), size: dec!(50) },
                PriceLevel { price: dec!(1.252), size: dec!(300) },
            ],
        }
    }

    #[test]
    fn test_well_formed() {
        assert!(book().is_well_formed());

        let crossed = OrderBook {
            bids: vec![PriceLevel { price: dec!(1.26), size: dec!(1) }],
            asks: vec![PriceLevel { price: dec!(1.25), size: dec!(1) }],
        };
        assert!(!crossed.is_well_formed());
    }

    #[test]
    fn test_vwap_single_level() {
        let fill = book().vwap_fill_price(OrderSide::Sell, dec!(50)).unwrap();
        assert_eq!(fill.avg_price, dec!(1.25));
        assert_eq!(fill.available, dec!(50));
    }

    #[test]
    fn test_vwap_walks_levels() {
        // Buying 100: 50 at 1.251 + 50 at 1.252
        let fill = book().vwap_fill_price(OrderSide::Buy, dec!(100)).unwrap();
        assert_eq!(fill.avg_price, dec!(1.2515));
        assert_eq!(fill.available, dec!(100));
    }

    #[test]
    fn test_vwap_exhausted_book() {
        let fill = book().vwap_fill_price(OrderSide::Buy, dec!(1000)).unwrap();
        // Only 350 available across both ask levels
        assert_eq!(fill.available, dec!(350));
    }

    #[test]
    fn test_vwap_rejects_bad_input() {
        assert!(book().vwap_fill_price(OrderSide::Buy, dec!(0)).is_none());
        let empty = OrderBook { bids: vec![], asks: vec![] };
        assert!(empty.vwap_fill_price(OrderSide::Sell, dec!(1)).is_none());
    }
}
