use orderbook::TokenId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub volume: f64,
}

impl PricePoint {
    /// Same liquidity seen from the other token: `1/price`, volume in the other unit.
    pub fn inverted(self) -> Self {
        Self {
            price: 1.0 / self.price,
            volume: self.volume * self.price,
        }
    }
}

/// Effective market between `base` and `quote`. Prices are quote per base and
/// volumes are in base units on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    #[serde(skip)]
    pub base: TokenId,
    #[serde(skip)]
    pub quote: TokenId,
    pub bids: Vec<PricePoint>,
    pub asks: Vec<PricePoint>,
}

impl Market {
    pub fn empty(base: TokenId, quote: TokenId) -> Self {
        Self {
            base,
            quote,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Bids highest first, asks lowest first.
    pub fn sort(&mut self) {
        self.bids.sort_by(|a, b| b.price.total_cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.total_cmp(&b.price));
    }

    pub fn inverted(&self) -> Market {
        let mut inverted = Market {
            base: self.quote,
            quote: self.base,
            bids: self.asks.iter().map(|ask| ask.inverted()).collect(),
            asks: self.bids.iter().map(|bid| bid.inverted()).collect(),
        };
        inverted.sort();
        inverted
    }

    /// Limit price at which `amount` base tokens can be sold into the bids, or
    /// `None` when the bids cannot absorb it.
    pub fn price_to_sell_base_token(&self, amount: f64) -> Option<f64> {
        let mut remaining = amount;
        for bid in &self.bids {
            if bid.volume >= remaining {
                return Some(bid.price);
            }
            remaining -= bid.volume;
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}
