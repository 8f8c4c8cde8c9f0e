//! Configuration loading from environment variables.
//!
//! All configuration values are loaded from `TILEPYRAMID_*` environment
//! variables with sensible defaults. Invalid values fall back to defaults
//! without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `TILEPYRAMID_PROCS` | 0 | Worker count (0 = one per CPU, 1 = inline) |
//! | `TILEPYRAMID_DRAIN_INTERVAL_MS` | 1000 | Timed drain period |
//! | `TILEPYRAMID_DRAIN_CHUNK_BUDGET` | 1000 | Jobs resolved per timed drain |
//! | `TILEPYRAMID_HIGH_WATER_BUDGET` | 10000 | Pending jobs before generation pauses |
//! | `TILEPYRAMID_LOW_WATER_BUDGET` | 500 | Pending jobs left after a forced drain |
//! | `TILEPYRAMID_LOG_FORMAT` | pretty | `pretty` or `json` |
//! | `TILEPYRAMID_LOG_LEVEL` | info | Log filter directive |
//! | `TILEPYRAMID_LOG_FILE` | unset | Write logs to this file instead of stderr |

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::scheduler::{resolve_concurrency, DrainPolicy};
use crate::telemetry::{LogConfig, LogFormat};

pub const ENV_PROCS: &str = "TILEPYRAMID_PROCS";
pub const ENV_DRAIN_INTERVAL_MS: &str = "TILEPYRAMID_DRAIN_INTERVAL_MS";
pub const ENV_DRAIN_CHUNK_BUDGET: &str = "TILEPYRAMID_DRAIN_CHUNK_BUDGET";
pub const ENV_HIGH_WATER_BUDGET: &str = "TILEPYRAMID_HIGH_WATER_BUDGET";
pub const ENV_LOW_WATER_BUDGET: &str = "TILEPYRAMID_LOW_WATER_BUDGET";
pub const ENV_LOG_FORMAT: &str = "TILEPYRAMID_LOG_FORMAT";
pub const ENV_LOG_LEVEL: &str = "TILEPYRAMID_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "TILEPYRAMID_LOG_FILE";

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub procs: usize,
    pub workers: usize,
    pub drain_interval_ms: u64,
    pub drain_chunk_budget: usize,
    pub high_water_budget: usize,
    pub low_water_budget: usize,
    pub log_format: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Requested worker count; 0 means one per CPU.
    pub procs: usize,
    pub drain: DrainPolicy,
    pub log: LogConfig,
}

impl EnvConfig {
    /// Worker count the run will actually use.
    pub fn workers(&self) -> usize {
        resolve_concurrency(self.procs)
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            procs: self.procs,
            workers: self.workers(),
            drain_interval_ms: self.drain.interval.as_millis() as u64,
            drain_chunk_budget: self.drain.chunk_budget,
            high_water_budget: self.drain.high_water_budget,
            low_water_budget: self.drain.low_water_budget,
            log_format: self.log.format.to_string(),
            log_level: self.log.level.clone(),
            log_file: self.log.output_path.clone(),
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Load drain policy from environment.
fn load_drain_policy() -> DrainPolicy {
    let defaults = DrainPolicy::default();
    let interval_ms = parse_u64(ENV_DRAIN_INTERVAL_MS, defaults.interval.as_millis() as u64);
    let chunk_budget = parse_usize(ENV_DRAIN_CHUNK_BUDGET, defaults.chunk_budget).max(1);
    let high_water_budget = parse_usize(ENV_HIGH_WATER_BUDGET, defaults.high_water_budget).max(1);
    let low_water_budget = parse_usize(ENV_LOW_WATER_BUDGET, defaults.low_water_budget);
    DrainPolicy {
        interval: Duration::from_millis(interval_ms),
        chunk_budget,
        high_water_budget,
        low_water_budget,
    }
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let format = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    let level = std::env::var(ENV_LOG_LEVEL)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "info".to_string());
    let output_path = std::env::var_os(ENV_LOG_FILE)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    LogConfig { format, level, output_path }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        procs: parse_usize(ENV_PROCS, 0),
        drain: load_drain_policy(),
        log: load_log_config(),
    }
}
