//! Batch entry points executed inside pool workers.
//!
//! Workers receive only pyramid indices and resolve them against the shared
//! [`RenderContext`] handed to the pool at construction. A batch checks the
//! run's cancellation token before every job, so a failed or interrupted run
//! stops within one job per worker.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::WorkerFailure;
use crate::pyramid::{chunks_in_range, InnerJob, JobBatch, LeafJob, Pyramid, PyramidIndex, SourceDataset};

/// Read-only state shared by every worker for the whole run.
pub struct RenderContext {
    pyramids: Vec<Box<dyn Pyramid>>,
    source: Arc<dyn SourceDataset>,
    cancel: CancellationToken,
}

impl RenderContext {
    pub fn new(pyramids: Vec<Box<dyn Pyramid>>, source: Arc<dyn SourceDataset>, cancel: CancellationToken) -> Self {
        Self { pyramids, source, cancel }
    }

    /// Token that stops every batch between jobs once cancelled.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn check_cancelled(&self) -> Result<(), WorkerFailure> {
        if self.cancel.is_cancelled() {
            return Err(WorkerFailure::Cancelled);
        }
        Ok(())
    }

    pub fn pyramids(&self) -> &[Box<dyn Pyramid>] {
        &self.pyramids
    }

    pub fn source(&self) -> &dyn SourceDataset {
        self.source.as_ref()
    }

    pub fn pyramid(&self, index: PyramidIndex) -> Result<&dyn Pyramid, WorkerFailure> {
        self.pyramids
            .get(index.get())
            .map(|p| &**p)
            .ok_or(WorkerFailure::UnknownPyramid(index.get()))
    }
}

/// Execute one batch of either variant. Returns the number of jobs done.
pub fn render_batch(context: &RenderContext, batch: JobBatch) -> Result<usize, WorkerFailure> {
    match batch {
        JobBatch::Leaf(jobs) => render_leaf_batch(context, jobs),
        JobBatch::Inner(jobs) => render_inner_batch(context, jobs),
    }
}

/// Render leaf tiles straight from source chunks.
///
/// Tiles with no intersecting chunks are still passed through so the
/// renderer can remove stale output.
pub fn render_leaf_batch(context: &RenderContext, jobs: Vec<LeafJob>) -> Result<usize, WorkerFailure> {
    let mut count = 0;
    for job in jobs {
        context.check_cancelled()?;
        let pyramid = context.pyramid(job.pyramid)?;
        let dest = pyramid.tile_dir().join(&job.path);
        let chunks = chunks_in_range(context.source(), &job.range);
        tracing::trace!(pyramid = job.pyramid.get(), chunks = chunks.len(), dest = %dest.display(), "leaf tile");
        pyramid
            .render_leaf(&chunks, &job.range, &dest)
            .map_err(|source| WorkerFailure::Render { pyramid: job.pyramid.get(), dest, source })?;
        count += 1;
    }
    Ok(count)
}

/// Compose inner tiles from their already rendered children.
pub fn render_inner_batch(context: &RenderContext, jobs: Vec<InnerJob>) -> Result<usize, WorkerFailure> {
    let mut count = 0;
    for job in jobs {
        context.check_cancelled()?;
        let pyramid = context.pyramid(job.pyramid)?;
        let dest = pyramid.tile_dir().join(&job.dest);
        pyramid
            .render_inner(&dest, &job.name)
            .map_err(|source| WorkerFailure::Render { pyramid: job.pyramid.get(), dest: dest.join(&job.name), source })?;
        count += 1;
    }
    Ok(count)
}
