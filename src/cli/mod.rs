//! CLI subcommands for `tilepyramid-cli`.
//!
//! ## Usage
//!
//! ```bash
//! tilepyramid-cli demo --depth 5 --layers 2   # Render marker pyramids
//! tilepyramid-cli plan 5 3                    # Show per-level job totals
//! tilepyramid-cli config show --json          # Effective configuration
//! ```
//!
//! Each command returns a process exit code: 0 on success, 1 on failure,
//! 2 on bad arguments.

pub mod config_cmd;
pub mod demo_cmd;
pub mod plan_cmd;

pub use demo_cmd::{run_demo, DemoArgs};
pub use plan_cmd::{run_plan, RenderPlan};
