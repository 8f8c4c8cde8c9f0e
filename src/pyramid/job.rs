//! Render job value types.
//!
//! Pyramids yield tiles without knowing their position in the run; the
//! batcher tags each tile with its pyramid's index so workers can resolve it
//! against the shared render context.

use std::fmt;
use std::path::PathBuf;

/// Stable index of a pyramid within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PyramidIndex(usize);

impl PyramidIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for PyramidIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of tile columns and rows in source-coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRange {
    pub col_start: i64,
    pub col_end: i64,
    pub row_start: i64,
    pub row_end: i64,
}

impl TileRange {
    pub fn new(col_start: i64, col_end: i64, row_start: i64, row_end: i64) -> Self {
        Self { col_start, col_end, row_start, row_end }
    }
}

/// A finest-resolution tile as yielded by a pyramid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafTile {
    pub range: TileRange,
    /// Path relative to the pyramid's tile directory.
    pub path: PathBuf,
}

/// A coarser tile composed from four children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerTile {
    /// Directory relative to the pyramid's tile directory.
    pub dest: PathBuf,
    pub name: String,
}

/// Leaf render job: render `range` from source chunks into `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafJob {
    pub pyramid: PyramidIndex,
    pub range: TileRange,
    pub path: PathBuf,
}

/// Inner render job: compose `name` inside `dest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerJob {
    pub pyramid: PyramidIndex,
    pub dest: PathBuf,
    pub name: String,
}

/// Tags a pyramid-local tile with the pyramid it belongs to.
pub trait IntoJob {
    type Job;

    fn into_job(self, pyramid: PyramidIndex) -> Self::Job;
}

impl IntoJob for LeafTile {
    type Job = LeafJob;

    fn into_job(self, pyramid: PyramidIndex) -> LeafJob {
        LeafJob { pyramid, range: self.range, path: self.path }
    }
}

impl IntoJob for InnerTile {
    type Job = InnerJob;

    fn into_job(self, pyramid: PyramidIndex) -> InnerJob {
        InnerJob { pyramid, dest: self.dest, name: self.name }
    }
}

/// A batch of jobs submitted to the pool as one unit of work.
///
/// Leaf and inner jobs are never mixed within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobBatch {
    Leaf(Vec<LeafJob>),
    Inner(Vec<InnerJob>),
}

impl JobBatch {
    pub fn len(&self) -> usize {
        match self {
            Self::Leaf(jobs) => jobs.len(),
            Self::Inner(jobs) => jobs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<LeafJob>> for JobBatch {
    fn from(jobs: Vec<LeafJob>) -> Self {
        Self::Leaf(jobs)
    }
}

impl From<Vec<InnerJob>> for JobBatch {
    fn from(jobs: Vec<InnerJob>) -> Self {
        Self::Inner(jobs)
    }
}
