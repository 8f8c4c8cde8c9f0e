//! Pending-result queue and backpressure.
//!
//! Submitted batches are held as [`PendingHandle`]s in FIFO order. The
//! distributor drains the oldest handles on a timer so progress keeps moving,
//! and down to a low-water mark whenever the queue reaches its high-water mark
//! so unresolved work stays bounded. Resolving a handle is the only place the
//! scheduler blocks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::pool::PendingHandle;
use crate::error::WorkerFailure;

/// Drain budgets, expressed in jobs and divided by the batch size at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// How often the oldest handles are resolved while jobs are generated.
    pub interval: Duration,
    /// Jobs resolved per timed drain.
    pub chunk_budget: usize,
    /// Jobs pending before generation pauses.
    pub high_water_budget: usize,
    /// Jobs pending once a forced drain stops.
    pub low_water_budget: usize,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            chunk_budget: 1000,
            high_water_budget: 10_000,
            low_water_budget: 500,
        }
    }
}

impl DrainPolicy {
    /// Queue limits in batches, using integer floor division.
    pub fn limits(&self, batch_size: usize) -> QueueLimits {
        let batch_size = batch_size.max(1);
        let high_water = (self.high_water_budget / batch_size).max(1);
        QueueLimits {
            drain_chunk: (self.chunk_budget / batch_size).max(1),
            high_water,
            low_water: (self.low_water_budget / batch_size).min(high_water - 1),
        }
    }
}

/// Queue limits in batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub drain_chunk: usize,
    pub high_water: usize,
    pub low_water: usize,
}

/// FIFO of outstanding batch handles.
#[derive(Debug)]
pub struct PendingQueue {
    handles: VecDeque<PendingHandle>,
    limits: QueueLimits,
    peak_depth: usize,
}

impl PendingQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            handles: VecDeque::with_capacity(limits.high_water),
            limits,
            peak_depth: 0,
        }
    }

    pub fn limits(&self) -> QueueLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Deepest the queue has been since creation.
    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    /// True when no further submission may be admitted before a drain.
    pub fn is_full(&self) -> bool {
        self.handles.len() >= self.limits.high_water
    }

    pub fn push(&mut self, handle: PendingHandle) {
        self.handles.push_back(handle);
        self.peak_depth = self.peak_depth.max(self.handles.len());
    }

    /// Resolve the oldest handle, blocking until its batch finishes.
    pub fn resolve_oldest(&mut self) -> Option<Result<usize, WorkerFailure>> {
        self.handles.pop_front().map(PendingHandle::resolve)
    }

    /// Resolve oldest handles until at most `target` remain.
    ///
    /// `on_resolved` receives each batch's completed-job count. Stops at the
    /// first failure.
    pub fn drain_to(&mut self, target: usize, mut on_resolved: impl FnMut(usize)) -> Result<(), WorkerFailure> {
        while self.handles.len() > target {
            match self.resolve_oldest() {
                Some(result) => on_resolved(result?),
                None => break,
            }
        }
        Ok(())
    }

    /// Resolve one timed chunk of handles.
    pub fn drain_chunk(&mut self, on_resolved: impl FnMut(usize)) -> Result<(), WorkerFailure> {
        let target = self.handles.len().saturating_sub(self.limits.drain_chunk);
        self.drain_to(target, on_resolved)
    }

    /// Resolve down to the low-water mark.
    pub fn drain_to_low_water(&mut self, on_resolved: impl FnMut(usize)) -> Result<(), WorkerFailure> {
        self.drain_to(self.limits.low_water, on_resolved)
    }
}

/// Fires at most once per interval.
#[derive(Debug)]
pub struct DrainTimer {
    interval: Duration,
    last: Instant,
}

impl DrainTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: Instant::now() }
    }

    /// True if an interval has passed since the last time this returned true.
    pub fn due(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}
