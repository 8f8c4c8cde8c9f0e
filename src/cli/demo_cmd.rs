//! `demo` subcommand: render marker pyramids over a synthetic world.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{self, EnvConfig};
use crate::pyramid::Pyramid;
use crate::scheduler::{DistributorOptions, RenderSummary};
use crate::synthetic::{MarkerPyramid, SyntheticWorld};
use crate::DistributeError;

/// Options for a demo run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoArgs {
    pub out: PathBuf,
    pub depth: u32,
    pub layers: usize,
    pub radius: i64,
    /// Overrides `TILEPYRAMID_PROCS` when set.
    pub procs: Option<usize>,
    pub json: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            out: PathBuf::from("tiles"),
            depth: 4,
            layers: 1,
            radius: 64,
            procs: None,
            json: false,
        }
    }
}

impl DemoArgs {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut parsed = Self::default();
        let mut iter = args.iter();
        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "--json" => parsed.json = true,
                "--out" | "-o" => parsed.out = PathBuf::from(value(flag, iter.next())?),
                "--depth" | "-d" => parsed.depth = number(flag, iter.next())?,
                "--layers" | "-l" => parsed.layers = number(flag, iter.next())?,
                "--radius" | "-r" => parsed.radius = number(flag, iter.next())?,
                "--procs" | "-p" => parsed.procs = Some(number(flag, iter.next())?),
                other => return Err(format!("unknown option: {other}")),
            }
        }
        if parsed.layers == 0 {
            return Err("--layers must be at least 1".to_string());
        }
        if parsed.depth > 12 {
            return Err(format!("--depth {} is too large for a demo (max 12)", parsed.depth));
        }
        Ok(parsed)
    }

    /// One marker pyramid per layer, each one zoom shallower than the last.
    pub fn pyramids(&self) -> Vec<Box<dyn Pyramid>> {
        (0..self.layers)
            .map(|i| {
                let depth = self.depth.saturating_sub(i as u32);
                let dir = self.out.join(format!("layer-{i}"));
                Box::new(MarkerPyramid::centered(depth, dir)) as Box<dyn Pyramid>
            })
            .collect()
    }
}

fn value<'a>(flag: &str, next: Option<&'a String>) -> Result<&'a str, String> {
    next.map(String::as_str).ok_or_else(|| format!("{flag} requires a value"))
}

fn number<T: std::str::FromStr>(flag: &str, next: Option<&String>) -> Result<T, String> {
    let raw = value(flag, next)?;
    raw.parse::<T>().map_err(|_| format!("invalid value for {flag}: {raw}"))
}

/// Run the demo render on a blocking thread, cancelling it on Ctrl-C.
pub async fn run_demo_render(
    demo: DemoArgs,
    env: &EnvConfig,
    cancel: CancellationToken,
) -> Result<RenderSummary, DistributeError> {
    let world = Arc::new(SyntheticWorld::filled(demo.radius));
    tracing::info!(
        chunks = world.chunk_count(),
        regions = world.region_count(),
        out = %demo.out.display(),
        "Synthetic world ready"
    );

    let options = DistributorOptions::new(demo.procs.unwrap_or(env.procs))
        .with_drain(env.drain)
        .with_cancel(cancel.clone());
    let pyramids = demo.pyramids();

    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupt received, cancelling queued batches");
                interrupt.cancel();
            }
            _ = interrupt.cancelled() => {}
        }
    });

    let result = tokio::task::spawn_blocking(move || crate::run_with_options(pyramids, world, options)).await;
    cancel.cancel();
    let _ = watcher.await;

    match result {
        Ok(summary) => summary,
        Err(e) => Err(DistributeError::Aborted(e.to_string())),
    }
}

/// Entry point for `tilepyramid-cli demo`. Returns the exit code.
pub async fn run_demo(args: &[String]) -> i32 {
    let demo = match DemoArgs::parse(args) {
        Ok(demo) => demo,
        Err(e) => {
            eprintln!("Error: {e}");
            return 2;
        }
    };
    let env = config::load();
    let json = demo.json;

    match run_demo_render(demo, &env, CancellationToken::new()).await {
        Ok(summary) => {
            print_summary(&summary, json);
            0
        }
        Err(e) if e.is_cancellation() => {
            eprintln!("Render cancelled");
            130
        }
        Err(e) => {
            tracing::error!(error = %e, "Render failed");
            eprintln!("Render failed: {e}");
            1
        }
    }
}

fn print_summary(summary: &RenderSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Failed to serialize summary: {e}"),
        }
        return;
    }
    println!("Batch size:    {}", summary.batch_size);
    println!("Workers:       {}", summary.workers);
    println!("Peak pending:  {}", summary.peak_pending);
    for level in &summary.levels {
        println!(
            "Level {:>2} (zoom {:>2}): {}/{} tiles",
            level.level, level.zoom, level.complete, level.total
        );
    }
    println!("Root tiles:    {}", summary.roots_rendered);
}
