use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use metrics::PoolMetrics;
use orderbook::CodecError;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::executor::JobExecutor;
use crate::job::{EstimationRequest, Job, JobOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    /// Jobs allowed to wait for a worker. Submissions beyond this are rejected.
    pub max_queue_depth: usize,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("estimation queue is full ({max_queue_depth} jobs pending)")]
    CapacityExceeded { max_queue_depth: usize },
    #[error("failed to decode snapshot: {0}")]
    Decode(#[from] CodecError),
    #[error("estimation worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("estimation pool is shut down")]
    ShutDown,
    #[error("estimation pool needs at least one worker")]
    NoWorkers,
    #[error("failed to spawn estimation worker: {0}")]
    Spawn(#[from] std::io::Error),
}

type JobResult = Result<JobOutput, PoolError>;

struct Envelope {
    job: Job,
    reply: oneshot::Sender<JobResult>,
}

/// Fixed set of OS threads that run estimation jobs off the async runtime.
///
/// Admission is bounded: at most `max_queue_depth` jobs wait while every worker
/// is busy. A job that panics fails alone and its worker keeps serving.
///
/// Dropping the pool closes admission. Workers finish what is already queued;
/// inside a tokio runtime they are joined on the blocking pool.
pub struct EstimationPool {
    sender: Option<Sender<Envelope>>,
    workers: Vec<JoinHandle<()>>,
    config: PoolConfig,
    metrics: Option<PoolMetrics>,
}

impl EstimationPool {
    pub fn new<E: JobExecutor>(config: PoolConfig, executor: E) -> Result<Self, PoolError> {
        Self::build(config, executor, None)
    }

    /// Like [`EstimationPool::new`], also tracking queue depth and rejections.
    pub fn with_metrics<E: JobExecutor>(
        config: PoolConfig,
        executor: E,
        metrics: PoolMetrics,
    ) -> Result<Self, PoolError> {
        Self::build(config, executor, Some(metrics))
    }

    fn build<E: JobExecutor>(
        config: PoolConfig,
        executor: E,
        metrics: Option<PoolMetrics>,
    ) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        let (sender, receiver) = bounded::<Envelope>(config.max_queue_depth);
        let executor: Arc<dyn JobExecutor> = Arc::new(executor);
        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let jobs = receiver.clone();
            let executor = Arc::clone(&executor);
            let metrics = metrics.clone();
            let handle = thread::Builder::new()
                .name(format!("estimator-{id}"))
                .spawn(move || worker_loop(id, jobs, executor, metrics))?;
            workers.push(handle);
        }
        info!(
            workers = config.workers,
            max_queue_depth = config.max_queue_depth,
            "estimation pool started"
        );
        Ok(Self {
            sender: Some(sender),
            workers,
            config,
            metrics,
        })
    }

    /// Queues a job against `snapshot` without blocking.
    pub fn submit(
        &self,
        request: EstimationRequest,
        snapshot: Arc<str>,
    ) -> Result<JobHandle, PoolError> {
        let sender = self.sender.as_ref().ok_or(PoolError::ShutDown)?;
        let (reply, receiver) = oneshot::channel();
        let envelope = Envelope {
            job: Job { snapshot, request },
            reply,
        };
        // counted before the send so a worker's decrement never runs first
        if let Some(metrics) = &self.metrics {
            metrics.queued.inc();
        }
        let result = sender.try_send(envelope);
        if let (Err(err), Some(metrics)) = (&result, &self.metrics) {
            metrics.queued.dec();
            if err.is_full() {
                metrics.rejected.inc();
            }
        }
        match result {
            Ok(()) => Ok(JobHandle { receiver }),
            Err(TrySendError::Full(_)) => Err(PoolError::CapacityExceeded {
                max_queue_depth: self.config.max_queue_depth,
            }),
            Err(TrySendError::Disconnected(_)) => Err(PoolError::ShutDown),
        }
    }

    /// Jobs admitted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, Sender::len)
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }
}

impl Drop for EstimationPool {
    fn drop(&mut self) {
        // closing the channel lets workers drain what is queued and exit
        self.sender.take();
        let workers = std::mem::take(&mut self.workers);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(move || join_workers(workers));
            }
            Err(_) => join_workers(workers),
        }
    }
}

fn join_workers(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if worker.join().is_err() {
            warn!("estimation worker exited abnormally");
        }
    }
    debug!("estimation pool stopped");
}

/// Resolves to the job's result once a worker has run it.
pub struct JobHandle {
    receiver: oneshot::Receiver<JobResult>,
}

impl Future for JobHandle {
    type Output = JobResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(PoolError::ShutDown)))
    }
}

fn worker_loop(
    id: usize,
    jobs: Receiver<Envelope>,
    executor: Arc<dyn JobExecutor>,
    metrics: Option<PoolMetrics>,
) {
    while let Ok(Envelope { job, reply }) = jobs.recv() {
        if let Some(metrics) = &metrics {
            metrics.queued.dec();
        }
        let result = match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&job))) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => {
                warn!(worker = id, error = %err, "estimation job failed");
                Err(PoolError::Decode(err))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(worker = id, %message, "estimation job panicked");
                Err(PoolError::WorkerPanicked(message))
            }
        };
        if reply.send(result).is_err() {
            debug!(worker = id, "estimation result dropped, caller went away");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
