use anyhow::Result;
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{info, warn};

pub const METRIC_PREFIX: &str = "dex_price_estimator";

const MARKET_LABELS: [&str; 3] = ["base", "quote", "hops"];

/// Counters for the snapshot refresh loop.
#[derive(Clone)]
pub struct FetcherMetrics {
    pub cycles: IntCounter,
    pub errors: IntCounter,
    pub duration: Histogram,
}

impl FetcherMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            cycles: IntCounter::with_opts(Opts::new(
                "order_book_fetcher_total",
                "Total number of queries for the order book source",
            ))?,
            errors: IntCounter::with_opts(Opts::new(
                "order_book_fetcher_error_total",
                "Total number of failed queries for the order book source",
            ))?,
            duration: Histogram::with_opts(HistogramOpts::new(
                "order_book_fetcher_duration_seconds",
                "Query duration for the order book source in seconds",
            ))?,
        };
        registry.register(Box::new(metrics.cycles.clone()))?;
        registry.register(Box::new(metrics.errors.clone()))?;
        registry.register(Box::new(metrics.duration.clone()))?;
        Ok(metrics)
    }
}

/// One family per request kind: totals plus a breakdown by market and hops.
#[derive(Clone)]
pub struct RequestMetrics {
    total: IntCounter,
    by_market: IntCounterVec,
    errors: IntCounterVec,
    duration_total: Histogram,
    duration_by_market: HistogramVec,
}

impl RequestMetrics {
    pub fn register(registry: &Registry, name: &str, subject: &str) -> Result<Self> {
        let metrics = Self {
            total: IntCounter::with_opts(Opts::new(
                format!("{name}_requests_total"),
                format!("Total requests of the {subject}"),
            ))?,
            by_market: IntCounterVec::new(
                Opts::new(
                    format!("{name}_requests"),
                    format!("Requests of the {subject} by market and hops"),
                ),
                &MARKET_LABELS,
            )?,
            errors: IntCounterVec::new(
                Opts::new(
                    format!("{name}_error_total"),
                    format!("Number of failed requests of the {subject}"),
                ),
                &MARKET_LABELS,
            )?,
            duration_total: Histogram::with_opts(HistogramOpts::new(
                format!("{name}_duration_seconds_total"),
                format!("Request duration of the {subject} in seconds"),
            ))?,
            duration_by_market: HistogramVec::new(
                HistogramOpts::new(
                    format!("{name}_duration_seconds"),
                    format!("Request duration of the {subject} in seconds by market and hops"),
                ),
                &MARKET_LABELS,
            )?,
        };
        registry.register(Box::new(metrics.total.clone()))?;
        registry.register(Box::new(metrics.by_market.clone()))?;
        registry.register(Box::new(metrics.errors.clone()))?;
        registry.register(Box::new(metrics.duration_total.clone()))?;
        registry.register(Box::new(metrics.duration_by_market.clone()))?;
        Ok(metrics)
    }

    pub fn observe(&self, labels: [&str; 3], seconds: f64, failed: bool) {
        self.total.inc();
        self.by_market.with_label_values(&labels).inc();
        if failed {
            self.errors.with_label_values(&labels).inc();
        }
        self.duration_total.observe(seconds);
        self.duration_by_market
            .with_label_values(&labels)
            .observe(seconds);
    }
}

#[derive(Clone)]
pub struct PoolMetrics {
    pub queued: IntGauge,
    pub rejected: IntCounter,
}

impl PoolMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self {
            queued: IntGauge::with_opts(Opts::new(
                "estimation_pool_queued",
                "Estimation jobs waiting for a worker",
            ))?,
            rejected: IntCounter::with_opts(Opts::new(
                "estimation_pool_rejected_total",
                "Estimation jobs rejected because the queue was full",
            ))?,
        };
        registry.register(Box::new(metrics.queued.clone()))?;
        registry.register(Box::new(metrics.rejected.clone()))?;
        Ok(metrics)
    }
}

#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
    fetcher: FetcherMetrics,
    markets: RequestMetrics,
    buy_amount: RequestMetrics,
    pool: PoolMetrics,
}

impl MetricsHandle {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some(METRIC_PREFIX.to_string()), None)?;
        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;
        Ok(Self {
            fetcher: FetcherMetrics::register(&registry)?,
            markets: RequestMetrics::register(&registry, "order_book", "order book")?,
            buy_amount: RequestMetrics::register(
                &registry,
                "buy_amount_estimation",
                "buy amount estimation",
            )?,
            pool: PoolMetrics::register(&registry)?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn fetcher(&self) -> FetcherMetrics {
        self.fetcher.clone()
    }

    pub fn markets(&self) -> RequestMetrics {
        self.markets.clone()
    }

    pub fn buy_amount(&self) -> RequestMetrics {
        self.buy_amount.clone()
    }

    pub fn pool(&self) -> PoolMetrics {
        self.pool.clone()
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let registry = self.registry.clone();
        let make_svc = make_service_fn(move |_| {
            let registry = registry.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let registry = registry.clone();
                    async move { Ok::<_, hyper::Error>(render(&registry)) }
                }))
            }
        });

        let server = Server::try_bind(&addr)?.serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }
}

pub fn render(registry: &Registry) -> Response<Body> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!(error = %err, "failed to encode metrics");
        let mut response = Response::new(Body::from(err.to_string()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        return response;
    }
    let mut response = Response::new(Body::from(buffer));
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}
