use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::RequestMetrics;
use orderbook::{SnapshotProvider, TokenId};
use pricegraph::{clamp_hops, BuyAmountEstimate, Market};
use thiserror::Error;
use tracing::{debug, warn};

use crate::job::{EstimationRequest, JobKind, JobOutput};
use crate::pool::{EstimationPool, PoolError};

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    pub max_hops: usize,
    pub rounding_buffer: f64,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum EstimateError {
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("estimation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("executor answered a {0:?} job with the wrong output")]
    MismatchedOutput(JobKind),
}

impl EstimateError {
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, EstimateError::Pool(PoolError::CapacityExceeded { .. }))
    }
}

#[derive(Clone)]
pub struct CoordinatorMetrics {
    pub markets: RequestMetrics,
    pub buy_amount: RequestMetrics,
}

/// Answers price queries against whatever snapshot is current when the request
/// arrives, computing on the [`EstimationPool`].
pub struct RequestCoordinator {
    provider: Arc<dyn SnapshotProvider>,
    pool: Arc<EstimationPool>,
    config: CoordinatorConfig,
    metrics: Option<CoordinatorMetrics>,
}

impl RequestCoordinator {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        pool: Arc<EstimationPool>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            provider,
            pool,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: CoordinatorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    pub async fn markets(
        &self,
        base: TokenId,
        quote: TokenId,
        hops: Option<usize>,
    ) -> Result<Market, EstimateError> {
        let request = EstimationRequest::EffectiveMarket {
            base,
            quote,
            hops: clamp_hops(hops, self.config.max_hops),
        };
        match self.dispatch(request).await? {
            JobOutput::Market(market) => Ok(market),
            JobOutput::BuyAmount(_) => Err(EstimateError::MismatchedOutput(JobKind::EffectiveMarket)),
        }
    }

    pub async fn estimated_buy_amount(
        &self,
        base: TokenId,
        quote: TokenId,
        sell_amount_in_quote: u128,
        hops: Option<usize>,
    ) -> Result<BuyAmountEstimate, EstimateError> {
        let request = EstimationRequest::EstimateBuyAmount {
            base,
            quote,
            hops: clamp_hops(hops, self.config.max_hops),
            sell_amount_in_quote,
            rounding_buffer: self.config.rounding_buffer,
        };
        match self.dispatch(request).await? {
            JobOutput::BuyAmount(estimate) => Ok(estimate),
            JobOutput::Market(_) => Err(EstimateError::MismatchedOutput(JobKind::EstimateBuyAmount)),
        }
    }

    async fn dispatch(&self, request: EstimationRequest) -> Result<JobOutput, EstimateError> {
        let started = Instant::now();
        let kind = request.kind();
        let (base, quote, hops) = (request.base(), request.quote(), request.hops());

        let result = self.run(request).await;

        let elapsed = started.elapsed();
        match &result {
            Ok(_) => debug!(
                ?kind,
                base,
                quote,
                hops,
                elapsed_ms = elapsed.as_millis() as u64,
                "estimation finished"
            ),
            Err(err) => warn!(?kind, base, quote, hops, error = %err, "estimation failed"),
        }
        if let Some(metrics) = &self.metrics {
            let family = match kind {
                JobKind::EffectiveMarket => &metrics.markets,
                JobKind::EstimateBuyAmount => &metrics.buy_amount,
            };
            let (base, quote, hops) = (base.to_string(), quote.to_string(), hops.to_string());
            family.observe(
                [base.as_str(), quote.as_str(), hops.as_str()],
                elapsed.as_secs_f64(),
                result.is_err(),
            );
        }
        result
    }

    async fn run(&self, request: EstimationRequest) -> Result<JobOutput, EstimateError> {
        let snapshot = self.provider.current().serialized();
        let handle = self.pool.submit(request, snapshot)?;
        match tokio::time::timeout(self.config.timeout, handle).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EstimateError::Timeout(self.config.timeout)),
        }
    }
}
