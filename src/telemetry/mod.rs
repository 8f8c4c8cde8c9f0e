//! Telemetry for render runs.
//!
//! Structured logging only; all output goes to stderr or a log file.

mod logging;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
