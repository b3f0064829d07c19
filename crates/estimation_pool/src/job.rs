use std::sync::Arc;

use orderbook::TokenId;
use pricegraph::{BuyAmountEstimate, Market};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    EffectiveMarket,
    EstimateBuyAmount,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EstimationRequest {
    EffectiveMarket {
        base: TokenId,
        quote: TokenId,
        hops: usize,
    },
    EstimateBuyAmount {
        base: TokenId,
        quote: TokenId,
        hops: usize,
        sell_amount_in_quote: u128,
        rounding_buffer: f64,
    },
}

impl EstimationRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            EstimationRequest::EffectiveMarket { .. } => JobKind::EffectiveMarket,
            EstimationRequest::EstimateBuyAmount { .. } => JobKind::EstimateBuyAmount,
        }
    }

    pub fn base(&self) -> TokenId {
        match self {
            EstimationRequest::EffectiveMarket { base, .. }
            | EstimationRequest::EstimateBuyAmount { base, .. } => *base,
        }
    }

    pub fn quote(&self) -> TokenId {
        match self {
            EstimationRequest::EffectiveMarket { quote, .. }
            | EstimationRequest::EstimateBuyAmount { quote, .. } => *quote,
        }
    }

    pub fn hops(&self) -> usize {
        match self {
            EstimationRequest::EffectiveMarket { hops, .. }
            | EstimationRequest::EstimateBuyAmount { hops, .. } => *hops,
        }
    }
}

/// Everything a worker needs: its own copy of the snapshot text and the query.
#[derive(Debug, Clone)]
pub struct Job {
    pub snapshot: Arc<str>,
    pub request: EstimationRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    Market(Market),
    BuyAmount(BuyAmountEstimate),
}
