//! Error types for tile pyramid rendering.
//!
//! Failures are fail-fast: the first worker failure observed while resolving
//! a pending batch aborts the whole run. Nothing here is retried.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by an external renderer or pyramid collaborator.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Message(String),
}

impl RenderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Failure that crossed the worker boundary.
///
/// Produced inside a worker and surfaced to the scheduler only when the
/// batch's pending handle is resolved.
#[derive(Debug, Error)]
pub enum WorkerFailure {
    #[error("render failed for pyramid {pyramid} at {dest}: {source}")]
    Render {
        pyramid: usize,
        dest: PathBuf,
        #[source]
        source: RenderError,
    },

    #[error("job references unknown pyramid index {0}")]
    UnknownPyramid(usize),

    #[error("render was cancelled")]
    Cancelled,

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker exited before reporting a result")]
    Disconnected,
}

impl WorkerFailure {
    /// Returns true if the failure came from cancellation rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors that abort a pyramid render run.
#[derive(Debug, Error)]
pub enum DistributeError {
    #[error("there must be at least one pyramid to work on")]
    NoPyramids,

    #[error("pyramid {index} has depth {depth}, more than the supported {max}")]
    DepthTooLarge { index: usize, depth: u32, max: u32 },

    #[error("pyramid {index} failed to prepare: {source}")]
    Prepare {
        index: usize,
        #[source]
        source: RenderError,
    },

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("batch failed on level {level}: {source}")]
    Worker {
        level: u32,
        #[source]
        source: WorkerFailure,
    },

    #[error("level barrier violated: {pending} batches still pending before level {level}")]
    LevelBarrier { level: u32, pending: usize },

    #[error("root tile for pyramid {index} failed: {source}")]
    Root {
        index: usize,
        #[source]
        source: RenderError,
    },

    #[error("render thread stopped unexpectedly: {0}")]
    Aborted(String),
}

impl DistributeError {
    /// Returns true if the run stopped because it was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Worker { source, .. } if source.is_cancellation())
    }
}
