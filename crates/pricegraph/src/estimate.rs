use orderbook::{Orderbooks, TokenId};
use serde::{Deserialize, Serialize};

use crate::combine::MarketCombiner;
use crate::market::Market;

/// Token ids go over the wire as the strings they were requested with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyAmountEstimate {
    #[serde(with = "token_id_string")]
    pub base_token_id: TokenId,
    #[serde(with = "token_id_string")]
    pub quote_token_id: TokenId,
    pub buy_amount_in_base: f64,
    pub sell_amount_in_quote: u128,
}

mod token_id_string {
    use orderbook::TokenId;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &TokenId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TokenId, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// A requested hop count above `max_hops` (or none at all) falls back to `max_hops`.
pub fn clamp_hops(requested: Option<usize>, max_hops: usize) -> usize {
    requested.map_or(max_hops, |hops| hops.min(max_hops))
}

pub fn effective_market<C>(
    combiner: &C,
    books: &Orderbooks,
    base: TokenId,
    quote: TokenId,
    max_hops: usize,
) -> Market
where
    C: MarketCombiner + ?Sized,
{
    let mut market = combiner.combine(books, base, quote, max_hops);
    market.sort();
    market
}

/// How many `base` tokens selling `sell_amount_in_quote` quote tokens should buy.
///
/// Prices are only defined for selling the base token, so the market is inverted
/// and the quote amount sold into its bids. A missing price (no route, or not
/// enough liquidity) estimates zero.
pub fn estimate_buy_amount<C>(
    combiner: &C,
    books: &Orderbooks,
    base: TokenId,
    quote: TokenId,
    max_hops: usize,
    sell_amount_in_quote: u128,
    rounding_buffer: f64,
) -> BuyAmountEstimate
where
    C: MarketCombiner + ?Sized,
{
    let market = effective_market(combiner, books, base, quote, max_hops);
    let sell_amount = sell_amount_in_quote as f64;
    let price = market
        .inverted()
        .price_to_sell_base_token(sell_amount)
        .unwrap_or(0.0);
    BuyAmountEstimate {
        base_token_id: base,
        quote_token_id: quote,
        buy_amount_in_base: (1.0 - rounding_buffer) * (sell_amount * price),
        sell_amount_in_quote,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::TransitiveCombiner;
    use crate::market::PricePoint;
    use orderbook::{MarketBook, MarketKey, Offer, Price};

    const ONE: u128 = 1_000_000_000_000_000_000;

    fn single_ask_books() -> Orderbooks {
        [MarketBook::with_asks(
            MarketKey::new(1, 7),
            vec![Offer {
                price: Price::new(2, 1).expect("price"),
                volume: ONE,
            }],
        )]
        .into_iter()
        .collect()
    }

    #[test]
    fn effective_market_of_single_ask_market() {
        let market = effective_market(&TransitiveCombiner, &single_ask_books(), 1, 7, 0);
        assert!(market.bids.is_empty());
        assert_eq!(
            market.asks,
            vec![PricePoint {
                price: 2.0,
                volume: ONE as f64
            }]
        );
    }

    #[test]
    fn estimate_applies_rounding_buffer() {
        let estimate =
            estimate_buy_amount(&TransitiveCombiner, &single_ask_books(), 1, 7, 0, ONE, 0.001);
        let expected = (1.0 - 0.001) * ONE as f64 / 2.0;
        assert!((estimate.buy_amount_in_base - expected).abs() <= expected * 1e-12);
        assert_eq!(estimate.sell_amount_in_quote, ONE);
        assert_eq!((estimate.base_token_id, estimate.quote_token_id), (1, 7));
    }

    #[test]
    fn no_route_estimates_zero() {
        let estimate =
            estimate_buy_amount(&TransitiveCombiner, &single_ask_books(), 1, 9, 2, ONE, 0.001);
        assert_eq!(estimate.buy_amount_in_base, 0.0);
    }

    #[test]
    fn insufficient_liquidity_estimates_zero() {
        // the single ask can only absorb 2 * ONE of token 7
        let estimate =
            estimate_buy_amount(&TransitiveCombiner, &single_ask_books(), 1, 7, 0, 3 * ONE, 0.0);
        assert_eq!(estimate.buy_amount_in_base, 0.0);
    }

    #[test]
    fn repeated_calls_are_bit_identical() {
        let books = single_ask_books();
        let first = effective_market(&TransitiveCombiner, &books, 1, 7, 2);
        let second = effective_market(&TransitiveCombiner, &books, 1, 7, 2);
        let bits = |m: &Market| -> Vec<(u64, u64)> {
            m.asks
                .iter()
                .chain(&m.bids)
                .map(|p| (p.price.to_bits(), p.volume.to_bits()))
                .collect()
        };
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn estimate_wire_form_carries_token_ids_as_strings() {
        let estimate =
            estimate_buy_amount(&TransitiveCombiner, &single_ask_books(), 1, 7, 0, ONE, 0.001);
        let json = serde_json::to_value(&estimate).expect("serializes");
        assert_eq!(json["baseTokenId"], "1");
        assert_eq!(json["quoteTokenId"], "7");
        assert_eq!(json["sellAmountInQuote"], 1_000_000_000_000_000_000u64);

        let back: BuyAmountEstimate = serde_json::from_value(json).expect("deserializes");
        assert_eq!((back.base_token_id, back.quote_token_id), (1, 7));
        assert!(serde_json::from_str::<BuyAmountEstimate>(
            r#"{"baseTokenId":"x","quoteTokenId":"7","buyAmountInBase":0.0,"sellAmountInQuote":1}"#
        )
        .is_err());
    }

    #[test]
    fn clamps_requested_hops() {
        assert_eq!(clamp_hops(None, 2), 2);
        assert_eq!(clamp_hops(Some(1), 2), 1);
        assert_eq!(clamp_hops(Some(5), 2), 2);
    }
}
