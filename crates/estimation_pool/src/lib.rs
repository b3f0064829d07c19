//! Bounded worker pool for price estimation and the request path in front of it.
//!
//! Every query captures the current snapshot text and hands it to a pool
//! thread, so a slow estimate never blocks the async runtime or a refresh.

mod coordinator;
mod executor;
mod job;
mod pool;

pub use coordinator::{CoordinatorConfig, CoordinatorMetrics, EstimateError, RequestCoordinator};
pub use executor::{JobExecutor, SnapshotExecutor};
pub use job::{EstimationRequest, Job, JobKind, JobOutput};
pub use pool::{EstimationPool, JobHandle, PoolConfig, PoolError};
