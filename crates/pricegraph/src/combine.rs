use std::collections::{BTreeMap, VecDeque};

use orderbook::{Orderbooks, TokenId};

use crate::market::{Market, PricePoint};

// Offers whose remaining volume falls under this fraction of their size are spent.
const DUST_RATIO: f64 = 1e-12;

/// Turns a multi-market snapshot into one effective market between two tokens.
pub trait MarketCombiner: Send + Sync {
    /// `max_hops` is the number of intermediate markets a path may go through;
    /// `0` only uses the direct books.
    fn combine(&self, books: &Orderbooks, base: TokenId, quote: TokenId, max_hops: usize) -> Market;
}

/// Repeatedly takes the cheapest path through the books (at most `max_hops + 1`
/// markets long) and consumes as much of it as its thinnest leg allows, so
/// liquidity shared between paths is only counted once.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitiveCombiner;

impl MarketCombiner for TransitiveCombiner {
    fn combine(&self, books: &Orderbooks, base: TokenId, quote: TokenId, max_hops: usize) -> Market {
        if base == quote {
            return Market::empty(base, quote);
        }
        let asks = LiquidityGraph::from_books(books).drain(base, quote, max_hops);
        let bids = LiquidityGraph::from_books(books)
            .drain(quote, base, max_hops)
            .into_iter()
            .map(PricePoint::inverted)
            .collect();
        Market {
            base,
            quote,
            bids,
            asks,
        }
    }
}

struct LiquidityGraph {
    edges: BTreeMap<TokenId, BTreeMap<TokenId, VecDeque<PricePoint>>>,
}

impl LiquidityGraph {
    fn from_books(books: &Orderbooks) -> Self {
        let mut edges: BTreeMap<TokenId, BTreeMap<TokenId, VecDeque<PricePoint>>> = BTreeMap::new();
        for book in books.iter() {
            let offers: VecDeque<PricePoint> = book
                .asks()
                .iter()
                .filter(|offer| offer.volume > 0)
                .map(|offer| PricePoint {
                    price: offer.price.to_f64(),
                    volume: offer.volume as f64,
                })
                .collect();
            if offers.is_empty() {
                continue;
            }
            let key = book.key();
            edges.entry(key.sell).or_default().insert(key.buy, offers);
        }
        Self { edges }
    }

    fn top(&self, sell: TokenId, buy: TokenId) -> Option<&PricePoint> {
        self.edges.get(&sell)?.get(&buy)?.front()
    }

    fn drain(mut self, from: TokenId, to: TokenId, max_hops: usize) -> Vec<PricePoint> {
        let mut offers = Vec::new();
        while let Some(path) = self.cheapest_path(from, to, max_hops) {
            match self.consume(&path) {
                Some(offer) => offers.push(offer),
                None => break,
            }
        }
        offers
    }

    fn cheapest_path(&self, from: TokenId, to: TokenId, max_hops: usize) -> Option<Vec<TokenId>> {
        let mut best = None;
        let mut path = vec![from];
        self.search(to, max_hops + 1, 1.0, &mut path, &mut best);
        best.map(|(_, path)| path)
    }

    fn search(
        &self,
        to: TokenId,
        legs_left: usize,
        cost: f64,
        path: &mut Vec<TokenId>,
        best: &mut Option<(f64, Vec<TokenId>)>,
    ) {
        let Some(&node) = path.last() else {
            return;
        };
        let Some(neighbours) = self.edges.get(&node) else {
            return;
        };
        for (&next, offers) in neighbours {
            let Some(top) = offers.front() else {
                continue;
            };
            let next_cost = cost * top.price;
            if next == to {
                if best.as_ref().map_or(true, |(best_cost, _)| next_cost < *best_cost) {
                    let mut found = path.clone();
                    found.push(next);
                    *best = Some((next_cost, found));
                }
                continue;
            }
            if legs_left <= 1 || path.contains(&next) {
                continue;
            }
            path.push(next);
            self.search(to, legs_left - 1, next_cost, path, best);
            path.pop();
        }
    }

    /// Fills as much of the path's top offers as possible. The bottleneck offer is
    /// always removed, which bounds the number of iterations by the offer count.
    fn consume(&mut self, path: &[TokenId]) -> Option<PricePoint> {
        let mut rate = 1.0;
        let mut capacity = f64::INFINITY;
        let mut bottleneck = 0;
        for (leg, pair) in path.windows(2).enumerate() {
            let top = self.top(pair[0], pair[1])?;
            let leg_capacity = top.volume / rate;
            if leg_capacity < capacity {
                capacity = leg_capacity;
                bottleneck = leg;
            }
            rate *= top.price;
        }
        let price = rate;

        let mut rate = 1.0;
        for (leg, pair) in path.windows(2).enumerate() {
            let offers = self.edges.get_mut(&pair[0])?.get_mut(&pair[1])?;
            let top = offers.front_mut()?;
            let used = capacity * rate;
            rate *= top.price;
            let left = top.volume - used;
            if leg == bottleneck || left <= top.volume * DUST_RATIO {
                offers.pop_front();
            } else {
                top.volume = left;
            }
        }

        Some(PricePoint {
            price,
            volume: capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbook::{MarketBook, MarketKey, Offer, Price};

    fn book(sell: TokenId, buy: TokenId, offers: &[(u128, u128, u128)]) -> MarketBook {
        MarketBook::with_asks(
            MarketKey::new(sell, buy),
            offers
                .iter()
                .map(|&(n, d, volume)| Offer {
                    price: Price::new(n, d).expect("price"),
                    volume,
                })
                .collect(),
        )
    }

    #[test]
    fn direct_market_yields_asks_and_reverse_book_yields_bids() {
        let books: Orderbooks = [
            book(1, 2, &[(2, 1, 100)]),
            book(2, 1, &[(1, 4, 400)]),
        ]
        .into_iter()
        .collect();
        let market = TransitiveCombiner.combine(&books, 1, 2, 0);
        assert_eq!(market.asks, vec![PricePoint { price: 2.0, volume: 100.0 }]);
        // selling 400 of token 2 at 1/4 token 1 each is a bid of 100 token 1 at 4
        assert_eq!(market.bids, vec![PricePoint { price: 4.0, volume: 100.0 }]);
    }

    #[test]
    fn hops_bound_the_path_length() {
        let books: Orderbooks = [book(1, 3, &[(2, 1, 100)]), book(3, 2, &[(3, 1, 1000)])]
            .into_iter()
            .collect();
        assert!(TransitiveCombiner.combine(&books, 1, 2, 0).is_empty());

        let market = TransitiveCombiner.combine(&books, 1, 2, 1);
        assert_eq!(market.asks.len(), 1);
        assert_eq!(market.asks[0].price, 6.0);
        // leg 3->2 could take 500 token 1 worth, leg 1->3 only 100
        assert_eq!(market.asks[0].volume, 100.0);
    }

    #[test]
    fn shared_leg_liquidity_is_not_double_counted() {
        let books: Orderbooks = [
            book(1, 2, &[(5, 1, 50)]),
            book(1, 3, &[(1, 1, 100)]),
            book(3, 2, &[(2, 1, 60)]),
        ]
        .into_iter()
        .collect();
        let market = TransitiveCombiner.combine(&books, 1, 2, 1);
        let asks: Vec<(f64, f64)> = market.asks.iter().map(|p| (p.price, p.volume)).collect();
        assert_eq!(asks, vec![(2.0, 60.0), (5.0, 50.0)]);
    }

    #[test]
    fn same_token_has_no_market() {
        let books: Orderbooks = [book(1, 1, &[(1, 1, 100)])].into_iter().collect();
        assert!(TransitiveCombiner.combine(&books, 1, 1, 2).is_empty());
    }
}
