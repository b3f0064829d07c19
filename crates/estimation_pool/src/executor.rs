use orderbook::{decode_text, CodecError};
use pricegraph::{effective_market, estimate_buy_amount, MarketCombiner, TransitiveCombiner};

use crate::job::{EstimationRequest, Job, JobOutput};

/// Worker-side computation. Runs on a pool thread with no access to the
/// submitter's state beyond the job itself.
pub trait JobExecutor: Send + Sync + 'static {
    fn execute(&self, job: &Job) -> Result<JobOutput, CodecError>;
}

/// Decodes the job's snapshot text and answers the request with a [`MarketCombiner`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotExecutor<C = TransitiveCombiner> {
    combiner: C,
}

impl<C: MarketCombiner> SnapshotExecutor<C> {
    pub fn new(combiner: C) -> Self {
        Self { combiner }
    }
}

impl<C: MarketCombiner + 'static> JobExecutor for SnapshotExecutor<C> {
    fn execute(&self, job: &Job) -> Result<JobOutput, CodecError> {
        let books = decode_text(&job.snapshot)?;
        let output = match job.request {
            EstimationRequest::EffectiveMarket { base, quote, hops } => {
                JobOutput::Market(effective_market(&self.combiner, &books, base, quote, hops))
            }
            EstimationRequest::EstimateBuyAmount {
                base,
                quote,
                hops,
                sell_amount_in_quote,
                rounding_buffer,
            } => JobOutput::BuyAmount(estimate_buy_amount(
                &self.combiner,
                &books,
                base,
                quote,
                hops,
                sell_amount_in_quote,
                rounding_buffer,
            )),
        };
        Ok(output)
    }
}
