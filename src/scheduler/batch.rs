//! Job batching logic.

use crate::pyramid::{IntoJob, PyramidIndex};

/// Smallest batch the pool is handed.
pub const MIN_BATCH_SIZE: usize = 10;

/// Starting batch share per pyramid before doubling.
pub const JOBS_PER_PYRAMID: usize = 4;

/// Configuration for batch processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
}

impl BatchConfig {
    /// Batch size for a run over `pyramid_count` pyramids.
    ///
    /// Starts at four jobs per pyramid and doubles until at least
    /// [`MIN_BATCH_SIZE`]; never smaller than one job per pyramid.
    pub fn for_pyramids(pyramid_count: usize) -> Self {
        let count = pyramid_count.max(1);
        let mut batch_size = JOBS_PER_PYRAMID * count;
        while batch_size < MIN_BATCH_SIZE {
            batch_size *= 2;
        }
        Self { batch_size: batch_size.max(count) }
    }

    /// Group a merged job stream into batches of this size.
    pub fn batches<I>(self, jobs: I) -> Batcher<I> {
        Batcher { jobs, batch_size: self.batch_size.max(1) }
    }
}

/// Groups `(pyramid, tile)` pairs into fixed-size job batches.
///
/// Each tile is tagged with its pyramid index on the way in. The last batch
/// may be short.
pub struct Batcher<I> {
    jobs: I,
    batch_size: usize,
}

impl<I, T> Iterator for Batcher<I>
where
    I: Iterator<Item = (PyramidIndex, T)>,
    T: IntoJob,
{
    type Item = Vec<T::Job>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        for (pyramid, tile) in self.jobs.by_ref() {
            batch.push(tile.into_job(pyramid));
            if batch.len() >= self.batch_size {
                break;
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}
