//! Tile pyramid renderer core.
//!
//! Builds multi-resolution tile pyramids level by level: the most detailed
//! (base) level is rendered from source data, then every coarser level is
//! composed from the level below it, and finally each pyramid's single root
//! tile. Several pyramids can be rendered in one run; their jobs are
//! interleaved fairly and batched across a pool of worker threads.
//!
//! # Guarantees
//!
//! - A level is fully resolved before any job of the next level is submitted.
//! - The number of unresolved batches is bounded while jobs are generated.
//! - The first worker failure aborts the run; nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tilepyramid::synthetic::{MarkerPyramid, SyntheticWorld};
//!
//! let world = Arc::new(SyntheticWorld::filled(64));
//! let pyramid = MarkerPyramid::centered(4, "out/terrain");
//! let summary = tilepyramid::run(vec![Box::new(pyramid)], world, 0)?;
//! println!("{} tiles", summary.total_complete());
//! # Ok::<(), tilepyramid::DistributeError>(())
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod pyramid;
pub mod scheduler;
pub mod synthetic;
pub mod telemetry;

use std::sync::Arc;

pub use error::{DistributeError, RenderError, WorkerFailure};
pub use pyramid::{Pyramid, Region, SourceDataset};
pub use scheduler::{DistributorOptions, JobDistributor, RenderSummary};

/// Render every pyramid completely using `concurrency` workers.
///
/// `concurrency` of 0 uses one worker per CPU; 1 renders inline on the
/// calling thread. Returns only when every tile, including the roots, has
/// been rendered, or with the first failure encountered.
pub fn run(
    pyramids: Vec<Box<dyn Pyramid>>,
    source: Arc<dyn SourceDataset>,
    concurrency: usize,
) -> Result<RenderSummary, DistributeError> {
    run_with_options(pyramids, source, DistributorOptions::new(concurrency))
}

/// Like [`run`], with explicit drain policy and cancellation token.
pub fn run_with_options(
    pyramids: Vec<Box<dyn Pyramid>>,
    source: Arc<dyn SourceDataset>,
    options: DistributorOptions,
) -> Result<RenderSummary, DistributeError> {
    JobDistributor::new(pyramids, source, options)?.run()
}
