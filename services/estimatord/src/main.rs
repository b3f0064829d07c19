mod admin;
mod api;

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use admin_ipc::{run_server, AdminRequest, DEFAULT_SOCKET_PATH};
use anyhow::bail;
use clap::Parser;
use estimation_pool::{
    CoordinatorConfig, CoordinatorMetrics, EstimationPool, PoolConfig, RequestCoordinator,
    SnapshotExecutor,
};
use metrics::MetricsHandle;
use orderbook::{VolumeBoundary, VolumePolicy, DEFAULT_MIN_TRADABLE_VOLUME};
use orderbook_fetcher::{FetcherConfig, JsonFileSource, SnapshotFetcher};
use pricegraph::TransitiveCombiner;
use tokio::task;
use tracing::{error, info, Level};
use uuid::Uuid;

use crate::admin::AdminContext;

#[derive(Parser, Debug)]
struct Args {
    /// JSON order dump written by the exchange exporter.
    #[arg(long, env = "ORDERS_PATH", default_value = "orders.json")]
    orders_path: PathBuf,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 10_000)]
    poll_interval_ms: u64,

    #[arg(long, env = "WORKERS", default_value_t = 4)]
    workers: usize,

    #[arg(long, env = "MAX_QUEUE_DEPTH", default_value_t = 64)]
    max_queue_depth: usize,

    #[arg(long, env = "MAX_HOPS", default_value_t = 2)]
    max_hops: usize,

    #[arg(long, env = "PRICE_ROUNDING_BUFFER", default_value_t = 0.001)]
    price_rounding_buffer: f64,

    #[arg(long, env = "MIN_TRADABLE_VOLUME", default_value_t = DEFAULT_MIN_TRADABLE_VOLUME)]
    min_tradable_volume: u128,

    /// Treat an order whose volume equals the minimum as dust.
    #[arg(long, env = "DROP_AT_THRESHOLD")]
    drop_at_threshold: bool,

    /// Serve an empty snapshot while resyncing after the source invalidates its state.
    #[arg(long, env = "CLEAR_ON_INVALIDATION")]
    clear_on_invalidation: bool,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 5_000)]
    request_timeout_ms: u64,

    #[arg(long, env = "API_ADDR", default_value = "127.0.0.1:8080")]
    api_addr: SocketAddr,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9586")]
    metrics_addr: SocketAddr,

    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    admin_socket: String,
}

impl Args {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            volume_policy: VolumePolicy {
                min_tradable: self.min_tradable_volume,
                boundary: if self.drop_at_threshold {
                    VolumeBoundary::DropAtThreshold
                } else {
                    VolumeBoundary::KeepAtThreshold
                },
            },
            clear_on_invalidation: self.clear_on_invalidation,
        }
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            workers: self.workers,
            max_queue_depth: self.max_queue_depth,
        }
    }

    fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_hops: self.max_hops,
            rounding_buffer: self.price_rounding_buffer,
            timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

fn validate_args(args: &Args) -> anyhow::Result<()> {
    if args.poll_interval_ms == 0 {
        bail!("poll interval must be at least 1ms");
    }
    if args.workers == 0 {
        bail!("at least one estimation worker is required");
    }
    if args.max_queue_depth == 0 {
        bail!("max queue depth must be positive");
    }
    if !(0.0..1.0).contains(&args.price_rounding_buffer) {
        bail!(
            "price rounding buffer must be in [0, 1), got {}",
            args.price_rounding_buffer
        );
    }
    if args.request_timeout_ms == 0 {
        bail!("request timeout must be at least 1ms");
    }
    if args.admin_socket.trim().is_empty() {
        bail!("admin socket path is empty");
    }
    Ok(())
}

fn log_startup(args: &Args, run_id: &str) {
    info!(path = %args.orders_path.display(), "order source configured");
    info!(
        workers = args.workers,
        max_queue_depth = args.max_queue_depth,
        max_hops = args.max_hops,
        "estimation pool planned"
    );
    info!(addr = %args.api_addr, "api bind planned");
    info!(socket = %args.admin_socket, "admin socket bind planned");
    info!(addr = %args.metrics_addr, "metrics bind planned");
    info!(%run_id, "run initialized");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    validate_args(&args)?;
    info!(
        orders = %args.orders_path.display(),
        api = %args.api_addr,
        "booting estimatord"
    );

    let run_id = Uuid::new_v4().to_string();
    log_startup(&args, &run_id);

    let metrics = MetricsHandle::new()?;
    let metrics_addr = args.metrics_addr;
    let metrics_task = metrics.clone();
    task::spawn(async move {
        if let Err(err) = metrics_task.serve(metrics_addr).await {
            error!(error = ?err, "metrics server error");
        }
    });

    let fetcher = SnapshotFetcher::with_metrics(
        JsonFileSource::new(&args.orders_path),
        args.fetcher_config(),
        metrics.fetcher(),
    );
    fetcher.start(args.poll_interval());

    let pool = EstimationPool::with_metrics(
        args.pool_config(),
        SnapshotExecutor::new(TransitiveCombiner),
        metrics.pool(),
    )?;
    let coordinator = RequestCoordinator::new(
        Arc::new(fetcher.clone()),
        Arc::new(pool),
        args.coordinator_config(),
    )
    .with_metrics(CoordinatorMetrics {
        markets: metrics.markets(),
        buy_amount: metrics.buy_amount(),
    });

    let admin = AdminContext {
        run_id: run_id.clone(),
        fetcher: fetcher.clone(),
        poll_interval: args.poll_interval(),
    };
    let socket_path = args.admin_socket.clone();
    task::spawn(async move {
        let handler = move |req: AdminRequest| {
            let admin = admin.clone();
            async move { admin.respond(req).await }
        };
        if let Err(err) = run_server(socket_path, handler).await {
            error!(error = ?err, "admin ipc server failed");
        }
    });

    info!(
        run_id = %run_id,
        api_addr = %args.api_addr,
        admin_socket = %args.admin_socket,
        metrics_addr = %args.metrics_addr,
        "ready"
    );

    tokio::select! {
        served = api::serve(args.api_addr, Arc::new(coordinator)) => served?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!(run_id = %run_id, "shutdown requested");
        }
    }
    fetcher.stop();
    Ok(())
}
