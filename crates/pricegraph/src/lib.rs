//! Effective markets and buy-amount estimates over an order snapshot.

mod combine;
mod estimate;
mod market;

pub use combine::{MarketCombiner, TransitiveCombiner};
pub use estimate::{clamp_hops, effective_market, estimate_buy_amount, BuyAmountEstimate};
pub use market::{Market, PricePoint};
