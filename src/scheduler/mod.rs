//! Job scheduling for pyramid builds.
//!
//! Merges per-pyramid job streams, groups them into batches, submits the
//! batches to a worker pool, and bounds the number of unresolved results
//! while a level is being generated.

mod batch;
mod distributor;
mod merge;
mod pool;
mod progress;
mod queue;
mod worker;

pub use batch::{BatchConfig, Batcher, JOBS_PER_PYRAMID, MIN_BATCH_SIZE};
pub use distributor::{plan_levels, DistributorOptions, JobDistributor, LevelSummary, RenderSummary};
pub use merge::RoundRobin;
pub use pool::{
    resolve_concurrency, BatchFn, BatchResult, InlinePool, PendingHandle, Pool, ThreadPool, ThreadPoolConfig,
    WorkerPool,
};
pub use progress::{should_report, ProgressReporter};
pub use queue::{DrainPolicy, DrainTimer, PendingQueue, QueueLimits};
pub use worker::{render_batch, render_inner_batch, render_leaf_batch, RenderContext};
