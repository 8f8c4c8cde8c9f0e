//! `plan` subcommand: show what a run would schedule without rendering.

use serde::Serialize;

use crate::config;
use crate::pyramid::MAX_DEPTH;
use crate::scheduler::{plan_levels, BatchConfig, LevelSummary, QueueLimits};

/// Scheduling plan for a set of pyramid depths.
#[derive(Debug, Clone, Serialize)]
pub struct RenderPlan {
    pub pyramids: usize,
    pub workers: usize,
    pub batch_size: usize,
    pub drain_chunk: usize,
    pub high_water: usize,
    pub low_water: usize,
    pub levels: Vec<LevelPlan>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LevelPlan {
    pub level: u32,
    pub zoom: u32,
    pub jobs: u64,
    pub batches: u64,
}

impl RenderPlan {
    pub fn new(depths: &[u32], workers: usize, limits_for: impl Fn(usize) -> QueueLimits) -> Self {
        let batch = BatchConfig::for_pyramids(depths.len());
        let limits = limits_for(batch.batch_size);
        let levels = plan_levels(depths)
            .into_iter()
            .map(|LevelSummary { level, zoom, total, .. }| LevelPlan {
                level,
                zoom,
                jobs: total,
                batches: total.div_ceil(batch.batch_size as u64),
            })
            .collect();
        Self {
            pyramids: depths.len(),
            workers,
            batch_size: batch.batch_size,
            drain_chunk: limits.drain_chunk,
            high_water: limits.high_water,
            low_water: limits.low_water,
            levels,
        }
    }
}

/// Parse depth arguments, e.g. `["5", "3", "--json"]`.
pub fn parse_depths(args: &[String]) -> Result<(Vec<u32>, bool), String> {
    let mut depths = Vec::new();
    let mut json = false;
    for arg in args {
        match arg.as_str() {
            "--json" => json = true,
            other => {
                let depth = other.parse::<u32>().map_err(|_| format!("invalid depth: {other}"))?;
                if depth > MAX_DEPTH {
                    return Err(format!("depth {depth} is too large (max {MAX_DEPTH})"));
                }
                depths.push(depth);
            }
        }
    }
    if depths.is_empty() {
        return Err("at least one pyramid depth is required".to_string());
    }
    Ok((depths, json))
}

/// Print the plan for the given arguments. Returns the exit code.
pub fn run_plan(args: &[String]) -> i32 {
    let (depths, json) = match parse_depths(args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Error: {e}");
            return 2;
        }
    };
    let env = config::load();
    let plan = RenderPlan::new(&depths, env.workers(), |batch| env.drain.limits(batch));

    if json {
        return match serde_json::to_string_pretty(&plan) {
            Ok(text) => {
                println!("{text}");
                0
            }
            Err(e) => {
                eprintln!("Failed to serialize plan: {e}");
                1
            }
        };
    }

    println!("Pyramids:   {}", plan.pyramids);
    println!("Workers:    {}", plan.workers);
    println!("Batch size: {}", plan.batch_size);
    println!(
        "Queue:      high {} / low {} / timed chunk {} batches",
        plan.high_water, plan.low_water, plan.drain_chunk
    );
    println!();
    println!("{:>6} {:>6} {:>12} {:>10}", "LEVEL", "ZOOM", "JOBS", "BATCHES");
    for level in &plan.levels {
        println!("{:>6} {:>6} {:>12} {:>10}", level.level, level.zoom, level.jobs, level.batches);
    }
    println!("{:>6} {:>6} {:>12} {:>10}", "root", 0, plan.pyramids, "-");
    0
}
