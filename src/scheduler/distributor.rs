//! Level-by-level job distribution.
//!
//! The distributor renders every pyramid's base level from source data, then
//! each coarser level in turn down to zoom 1, and finally the root tiles on
//! its own thread. A level is fully resolved before the next one is
//! submitted, because a coarser tile is composed from its four children.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::batch::BatchConfig;
use super::merge::RoundRobin;
use super::pool::{resolve_concurrency, Pool, WorkerPool};
use super::progress::ProgressReporter;
use super::queue::{DrainPolicy, DrainTimer, PendingQueue};
use super::worker::{render_batch, RenderContext};
use crate::error::DistributeError;
use crate::pyramid::{IntoJob, JobBatch, Pyramid, PyramidIndex, SourceDataset, MAX_DEPTH, ROOT_TILE_NAME};

/// Options for one render run.
#[derive(Debug, Clone)]
pub struct DistributorOptions {
    /// Worker count; 1 runs batches inline, 0 uses one worker per CPU.
    pub concurrency: usize,
    pub drain: DrainPolicy,
    /// Cancelling this stops every batch before its next job.
    pub cancel: CancellationToken,
}

impl DistributorOptions {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            drain: DrainPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_drain(mut self, drain: DrainPolicy) -> Self {
        self.drain = drain;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Completion counts for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelSummary {
    /// 1 for the base level, counting up towards the root.
    pub level: u32,
    /// Zoom rendered on this level; for the base level, the deepest zoom.
    pub zoom: u32,
    pub total: u64,
    pub complete: u64,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub batch_size: usize,
    pub workers: usize,
    pub max_level: u32,
    pub levels: Vec<LevelSummary>,
    pub roots_rendered: usize,
    /// Deepest the pending queue got while jobs were being generated.
    pub peak_pending: usize,
}

impl RenderSummary {
    /// Jobs completed across all pooled levels (root tiles excluded).
    pub fn total_complete(&self) -> u64 {
        self.levels.iter().map(|l| l.complete).sum()
    }
}

type TaggedTiles<'a, T> = Box<dyn Iterator<Item = (PyramidIndex, T)> + 'a>;

/// Scheduling state carried from one level to the next.
struct RunState {
    batch: BatchConfig,
    queue: PendingQueue,
    progress: ProgressReporter,
}

/// The level being driven and how many jobs it has.
#[derive(Debug, Clone, Copy)]
struct LevelJobs {
    level: u32,
    total: u64,
}

fn tiles_at(zoom: u32) -> u64 {
    4u64.saturating_pow(zoom)
}

/// Job totals per level for pyramids of the given depths, base level first.
///
/// The returned summaries have `complete == 0`.
pub fn plan_levels(depths: &[u32]) -> Vec<LevelSummary> {
    let max_depth = depths.iter().copied().max().unwrap_or(0);
    let base_total = depths.iter().fold(0u64, |acc, &d| acc.saturating_add(tiles_at(d)));
    let mut levels = vec![LevelSummary { level: 1, zoom: max_depth, total: base_total, complete: 0 }];
    for zoom in (1..max_depth).rev() {
        let eligible = depths.iter().filter(|&&d| d >= zoom).count() as u64;
        levels.push(LevelSummary {
            level: max_depth - zoom + 1,
            zoom,
            total: tiles_at(zoom).saturating_mul(eligible),
            complete: 0,
        });
    }
    levels
}

/// Drives a full pyramid build across a worker pool.
pub struct JobDistributor {
    context: Arc<RenderContext>,
    options: DistributorOptions,
    workers: usize,
}

impl JobDistributor {
    /// Validate the pyramids and run their per-run preparation.
    ///
    /// Pyramid indices are their positions in `pyramids`. Depths above
    /// [`MAX_DEPTH`] are rejected before any pyramid is prepared.
    pub fn new(
        mut pyramids: Vec<Box<dyn Pyramid>>,
        source: Arc<dyn SourceDataset>,
        options: DistributorOptions,
    ) -> Result<Self, DistributeError> {
        if pyramids.is_empty() {
            return Err(DistributeError::NoPyramids);
        }
        if let Some((index, depth)) = pyramids
            .iter()
            .map(|p| p.depth())
            .enumerate()
            .find(|&(_, depth)| depth > MAX_DEPTH)
        {
            return Err(DistributeError::DepthTooLarge { index, depth, max: MAX_DEPTH });
        }
        let workers = resolve_concurrency(options.concurrency);
        for (index, pyramid) in pyramids.iter_mut().enumerate() {
            pyramid
                .prepare(workers)
                .map_err(|source| DistributeError::Prepare { index, source })?;
        }
        let cancel = options.cancel.child_token();
        Ok(Self {
            context: Arc::new(RenderContext::new(pyramids, source, cancel)),
            options,
            workers,
        })
    }

    /// Deepest zoom across all pyramids.
    pub fn max_depth(&self) -> u32 {
        self.context.pyramids().iter().map(|p| p.depth()).max().unwrap_or(0)
    }

    /// Render every level, then the root tiles.
    ///
    /// Returns on the first failure; batches already finished stay on disk.
    /// Batches still running stop before their next job.
    pub fn run(self) -> Result<RenderSummary, DistributeError> {
        tracing::debug!(pid = std::process::id(), "parent process");
        let cancel = self.context.cancel_token().clone();
        let pool = Pool::for_concurrency(self.workers, Arc::clone(&self.context), cancel.clone())
            .map_err(DistributeError::Spawn)?;

        let mut summary = match self.render_levels(&pool) {
            Ok(summary) => summary,
            Err(err) => {
                // Stop running batches before the dropped pool joins its workers.
                cancel.cancel();
                tracing::debug!(error = %err, "run failed, cancelling outstanding batches");
                return Err(err);
            }
        };
        pool.shutdown();

        summary.roots_rendered = self.render_roots()?;
        Ok(summary)
    }

    fn render_levels(&self, pool: &Pool<RenderContext>) -> Result<RenderSummary, DistributeError> {
        let pyramids = self.context.pyramids();
        let max_depth = self.max_depth();
        let batch = BatchConfig::for_pyramids(pyramids.len());
        let mut state = RunState {
            batch,
            queue: PendingQueue::new(self.options.drain.limits(batch.batch_size)),
            progress: ProgressReporter::new(max_depth),
        };
        let mut levels = Vec::with_capacity(max_depth.max(1) as usize);

        let total = pyramids.iter().fold(0u64, |acc, p| acc.saturating_add(tiles_at(p.depth())));
        tracing::info!("Rendering highest zoom level of tiles now.");
        tracing::info!(
            layers = pyramids.len(),
            "Rendering {} layer{}",
            pyramids.len(),
            if pyramids.len() > 1 { "s" } else { "" }
        );
        tracing::info!(total, "There are {} tiles to render", total);
        tracing::info!(levels = max_depth, "There are {} total levels to render", max_depth);
        tracing::info!("Don't worry, each level has only 25% as many tiles as the last.");
        tracing::info!("The others will go faster");

        let sources = pyramids.iter().enumerate().map(|(i, p)| tag(i, p.leaf_tiles()));
        let complete = self.drive_level(pool, &mut state, LevelJobs { level: 1, total }, sources)?;
        levels.push(LevelSummary { level: 1, zoom: max_depth, total, complete });

        for zoom in (1..max_depth).rev() {
            let level = max_depth - zoom + 1;
            if !state.queue.is_empty() {
                return Err(DistributeError::LevelBarrier { level, pending: state.queue.len() });
            }
            let eligible: Vec<(usize, &dyn Pyramid)> = pyramids
                .iter()
                .enumerate()
                .filter(|(_, p)| p.depth() >= zoom)
                .map(|(i, p)| (i, &**p))
                .collect();
            let total = tiles_at(zoom).saturating_mul(eligible.len() as u64);

            tracing::info!(level, zoom, "Starting level {}", level);
            let sources = eligible.into_iter().map(|(i, p)| tag(i, p.inner_tiles(zoom)));
            let complete = self.drive_level(pool, &mut state, LevelJobs { level, total }, sources)?;
            levels.push(LevelSummary { level, zoom, total, complete });
            tracing::info!(level, "Done");
        }

        Ok(RenderSummary {
            batch_size: batch.batch_size,
            workers: pool.workers(),
            max_level: max_depth,
            levels,
            roots_rendered: 0,
            peak_pending: state.queue.peak_depth(),
        })
    }

    /// Merge, batch, and submit one level's jobs, then drain every result.
    fn drive_level<'a, T, S>(
        &self,
        pool: &Pool<RenderContext>,
        state: &mut RunState,
        jobs: LevelJobs,
        sources: S,
    ) -> Result<u64, DistributeError>
    where
        T: IntoJob + 'a,
        Vec<T::Job>: Into<JobBatch>,
        S: IntoIterator<Item = TaggedTiles<'a, T>>,
    {
        let RunState { batch, queue, progress } = state;
        let LevelJobs { level, total } = jobs;
        let worker_failed = |source| DistributeError::Worker { level, source };
        let mut submissions = batch
            .batches(RoundRobin::new(sources))
            .map(|jobs| pool.submit(render_batch, jobs.into()));
        let mut timer = DrainTimer::new(self.options.drain.interval);
        let mut complete = 0u64;
        let mut on_resolved = |n: usize| {
            complete += n as u64;
            progress.report(complete, total, level, false);
        };

        loop {
            if queue.is_full() {
                queue.drain_to_low_water(&mut on_resolved).map_err(worker_failed)?;
            }

            let Some(handle) = submissions.next() else {
                break;
            };
            queue.push(handle);

            if timer.due() {
                queue.drain_chunk(&mut on_resolved).map_err(worker_failed)?;
            }
        }

        queue.drain_to(0, &mut on_resolved).map_err(worker_failed)?;
        progress.report(complete, total, level, true);
        Ok(complete)
    }

    /// Render each pyramid's single root tile on the calling thread.
    fn render_roots(&self) -> Result<usize, DistributeError> {
        let pyramids = self.context.pyramids();
        for (index, pyramid) in pyramids.iter().enumerate() {
            pyramid
                .render_inner(pyramid.tile_dir(), ROOT_TILE_NAME)
                .map_err(|source| DistributeError::Root { index, source })?;
        }
        Ok(pyramids.len())
    }
}

fn tag<'a, T: 'a>(index: usize, tiles: Box<dyn Iterator<Item = T> + 'a>) -> TaggedTiles<'a, T> {
    let index = PyramidIndex::new(index);
    Box::new(tiles.map(move |tile| (index, tile)))
}
