use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ethnum::U256;

pub type TokenId = u16;

/// Ordered `(sell, buy)` token pair. `1-7` and `7-1` are different markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarketKey {
    pub sell: TokenId,
    pub buy: TokenId,
}

impl MarketKey {
    pub fn new(sell: TokenId, buy: TokenId) -> Self {
        Self { sell, buy }
    }

    pub fn reversed(self) -> Self {
        Self {
            sell: self.buy,
            buy: self.sell,
        }
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.sell, self.buy)
    }
}

impl FromStr for MarketKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sell, buy) = s
            .split_once('-')
            .ok_or_else(|| format!("market key `{s}` is not of the form <sell>-<buy>"))?;
        let sell = sell
            .parse::<TokenId>()
            .map_err(|err| format!("invalid sell token in `{s}`: {err}"))?;
        let buy = buy
            .parse::<TokenId>()
            .map_err(|err| format!("invalid buy token in `{s}`: {err}"))?;
        Ok(Self { sell, buy })
    }
}

/// Exact ratio of buy-token amount per sell-token amount. Neither part is zero.
///
/// Equality is structural (`2/1 != 4/2`); use [`Price::cmp_value`] to order by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Price {
    numerator: u128,
    denominator: u128,
}

impl Price {
    pub fn new(numerator: u128, denominator: u128) -> Option<Self> {
        if numerator == 0 || denominator == 0 {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    pub fn numerator(&self) -> u128 {
        self.numerator
    }

    pub fn denominator(&self) -> u128 {
        self.denominator
    }

    pub fn cmp_value(&self, other: &Price) -> Ordering {
        let lhs = U256::from(self.numerator) * U256::from(other.denominator);
        let rhs = U256::from(other.numerator) * U256::from(self.denominator);
        lhs.cmp(&rhs)
    }

    pub fn to_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offer {
    pub price: Price,
    pub volume: u128,
}

/// Asks of one ordered market, cheapest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketBook {
    key: MarketKey,
    asks: Vec<Offer>,
}

impl MarketBook {
    pub fn new(key: MarketKey) -> Self {
        Self {
            key,
            asks: Vec::new(),
        }
    }

    pub fn with_asks(key: MarketKey, asks: Vec<Offer>) -> Self {
        Self { key, asks }
    }

    pub fn key(&self) -> MarketKey {
        self.key
    }

    pub fn asks(&self) -> &[Offer] {
        &self.asks
    }

    pub fn add_ask(&mut self, offer: Offer) {
        self.asks.push(offer);
    }

    /// Stable, so offers at equal prices keep their source order.
    pub fn sort_asks(&mut self) {
        self.asks.sort_by(|a, b| a.price.cmp_value(&b.price));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Orderbooks {
    books: BTreeMap<MarketKey, MarketBook>,
}

impl Orderbooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MarketKey) -> Option<&MarketBook> {
        self.books.get(key)
    }

    pub fn insert(&mut self, book: MarketBook) -> Option<MarketBook> {
        self.books.insert(book.key(), book)
    }

    pub fn book_mut(&mut self, key: MarketKey) -> &mut MarketBook {
        self.books.entry(key).or_insert_with(|| MarketBook::new(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketBook> {
        self.books.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = MarketKey> + '_ {
        self.books.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn sort_asks(&mut self) {
        for book in self.books.values_mut() {
            book.sort_asks();
        }
    }

    pub fn offer_count(&self) -> usize {
        self.books.values().map(|book| book.asks.len()).sum()
    }
}

impl FromIterator<MarketBook> for Orderbooks {
    fn from_iter<T: IntoIterator<Item = MarketBook>>(iter: T) -> Self {
        Self {
            books: iter.into_iter().map(|book| (book.key(), book)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_key_parses_and_displays() {
        let key: MarketKey = "1-7".parse().expect("valid key");
        assert_eq!(key, MarketKey::new(1, 7));
        assert_eq!(key.to_string(), "1-7");
        assert_eq!(key.reversed(), MarketKey::new(7, 1));
    }

    #[test]
    fn market_key_rejects_garbage() {
        assert!("17".parse::<MarketKey>().is_err());
        assert!("a-7".parse::<MarketKey>().is_err());
        assert!("1-70000".parse::<MarketKey>().is_err());
    }

    #[test]
    fn price_rejects_zero_parts() {
        assert!(Price::new(0, 1).is_none());
        assert!(Price::new(1, 0).is_none());
        assert!(Price::new(3, 2).is_some());
    }

    #[test]
    fn price_compares_by_value_without_overflow() {
        let a = Price::new(u128::MAX, 1).expect("price");
        let b = Price::new(u128::MAX - 1, 1).expect("price");
        assert_eq!(a.cmp_value(&b), Ordering::Greater);

        let half = Price::new(1, 2).expect("price");
        let also_half = Price::new(50, 100).expect("price");
        assert_eq!(half.cmp_value(&also_half), Ordering::Equal);
        assert_ne!(half, also_half);
    }

    #[test]
    fn sort_asks_orders_cheapest_first() {
        let mut book = MarketBook::new(MarketKey::new(1, 2));
        for (n, d) in [(3, 1), (1, 2), (2, 1)] {
            book.add_ask(Offer {
                price: Price::new(n, d).expect("price"),
                volume: 10,
            });
        }
        book.sort_asks();
        let prices: Vec<f64> = book.asks().iter().map(|o| o.price.to_f64()).collect();
        assert_eq!(prices, vec![0.5, 2.0, 3.0]);
    }
}
