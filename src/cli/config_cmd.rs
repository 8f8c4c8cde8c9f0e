//! Config CLI subcommands: show, defaults, validate.
//!
//! These commands read configuration directly from environment variables.

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::scheduler::DrainPolicy;
use crate::telemetry::LogConfig;

/// Print effective config to stdout, as key-value pairs or JSON.
pub fn run_show(json: bool) -> i32 {
    let cfg = config::load().effective_config();
    if json {
        return print_json(&cfg);
    }
    print_config(&cfg);
    0
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    let defaults = EnvConfig {
        procs: 0,
        drain: DrainPolicy::default(),
        log: LogConfig::default(),
    };
    print_config(&defaults.effective_config());
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found.
pub fn run_validate() -> i32 {
    let warnings = validate(&config::load());
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Collect human-readable warnings for a loaded configuration.
pub fn validate(env: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let drain = &env.drain;

    if drain.low_water_budget >= drain.high_water_budget {
        warnings.push(format!(
            "{} ({}) >= {} ({}); forced drains will only resolve one batch",
            config::ENV_LOW_WATER_BUDGET,
            drain.low_water_budget,
            config::ENV_HIGH_WATER_BUDGET,
            drain.high_water_budget
        ));
    }

    if drain.interval.is_zero() {
        warnings.push(format!("{} is 0; a timed drain runs after every submission", config::ENV_DRAIN_INTERVAL_MS));
    }

    warnings
}

fn print_json(cfg: &EffectiveConfig) -> i32 {
    match serde_json::to_string_pretty(cfg) {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            1
        }
    }
}

fn print_config(cfg: &EffectiveConfig) {
    println!("{}={} (workers: {})", config::ENV_PROCS, cfg.procs, cfg.workers);
    println!("{}={}", config::ENV_DRAIN_INTERVAL_MS, cfg.drain_interval_ms);
    println!("{}={}", config::ENV_DRAIN_CHUNK_BUDGET, cfg.drain_chunk_budget);
    println!("{}={}", config::ENV_HIGH_WATER_BUDGET, cfg.high_water_budget);
    println!("{}={}", config::ENV_LOW_WATER_BUDGET, cfg.low_water_budget);
    println!("{}={}", config::ENV_LOG_FORMAT, cfg.log_format);
    println!("{}={}", config::ENV_LOG_LEVEL, cfg.log_level);
    match &cfg.log_file {
        Some(path) => println!("{}={}", config::ENV_LOG_FILE, path.display()),
        None => println!("{}=", config::ENV_LOG_FILE),
    }
}
