//! tilepyramid-cli entry point.
//!
//! ## CLI Subcommands
//!
//! - `tilepyramid-cli demo` - Render marker pyramids over a synthetic world
//! - `tilepyramid-cli plan DEPTH...` - Show per-level job totals and queue limits
//! - `tilepyramid-cli config show|defaults|validate` - Inspect configuration

use std::process::ExitCode;

use tilepyramid::cli::config_cmd;
use tilepyramid::cli::{run_demo, run_plan};
use tilepyramid::config;
use tilepyramid::telemetry::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        "demo" => {
            let env = config::load();
            if let Err(e) = init_logging(&env.log) {
                eprintln!("Failed to initialize logging: {}", e);
                return ExitCode::from(2u8);
            }
            exit_code(run_demo(rest).await)
        }
        "plan" => exit_code(run_plan(rest)),
        "config" => {
            let subcommand = rest.first().map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    let json = rest.get(1).map(|s| s.as_str()) == Some("--json");
                    exit_code(config_cmd::run_show(json))
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = rest.first() {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("tilepyramid {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "tilepyramid - level-by-level tile pyramid renderer v{}

USAGE:
    tilepyramid-cli [COMMAND] [OPTIONS]

COMMANDS:
    demo         Render marker pyramids over a synthetic world
    plan         Show per-level job totals for pyramid depths
    config       Inspect configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

EXAMPLES:
    tilepyramid-cli demo --out tiles --depth 5 --layers 2
    tilepyramid-cli plan 6 4 --json
    tilepyramid-cli config validate

ENVIRONMENT:
    TILEPYRAMID_PROCS              Worker count (0 = one per CPU, 1 = inline)
    TILEPYRAMID_DRAIN_INTERVAL_MS  Timed drain period (default: 1000)
    TILEPYRAMID_DRAIN_CHUNK_BUDGET Jobs resolved per timed drain (default: 1000)
    TILEPYRAMID_HIGH_WATER_BUDGET  Pending jobs before generation pauses (default: 10000)
    TILEPYRAMID_LOW_WATER_BUDGET   Pending jobs left after a forced drain (default: 500)
    TILEPYRAMID_LOG_FORMAT         pretty or json (default: pretty)
    TILEPYRAMID_LOG_LEVEL          Log filter directive (default: info)
    TILEPYRAMID_LOG_FILE           Write logs to a file instead of stderr

EXIT CODES:
    0    Success
    1    Render or validation failure
    2    Invalid arguments or logging setup error
    130  Cancelled by Ctrl-C
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "demo" => {
            eprintln!(
                "tilepyramid-cli demo - Render marker pyramids

USAGE:
    tilepyramid-cli demo [OPTIONS]

OPTIONS:
    -o, --out DIR      Output directory (default: tiles)
    -d, --depth N      Depth of the first pyramid (default: 4)
    -l, --layers N     Number of pyramids, each one zoom shallower (default: 1)
    -r, --radius N     Synthetic world spans chunks [-N, N) (default: 64)
    -p, --procs N      Worker count, overrides TILEPYRAMID_PROCS
    --json             Print the run summary as JSON

DESCRIPTION:
    Builds an in-memory world and renders one marker file per tile into
    DIR/layer-K. Ctrl-C stops batches before their next job and exits with code 130.
"
            );
        }
        "plan" => {
            eprintln!(
                "tilepyramid-cli plan - Show per-level job totals

USAGE:
    tilepyramid-cli plan DEPTH [DEPTH...] [--json]

DESCRIPTION:
    Prints the batch size, the pending-queue limits derived from the
    current configuration, and the number of jobs and batches on each
    level for pyramids of the given depths.
"
            );
        }
        "config" => {
            eprintln!(
                "tilepyramid-cli config - Inspect configuration

USAGE:
    tilepyramid-cli config show [--json]
    tilepyramid-cli config defaults
    tilepyramid-cli config validate

DESCRIPTION:
    show      Print effective values from TILEPYRAMID_* variables
    defaults  Print built-in defaults
    validate  Warn on inconsistent drain budgets (exit 1 on warnings)
"
            );
        }
        _ => {
            eprintln!("No help available for '{}'", command);
            print_usage();
        }
    }
}
