#![forbid(unsafe_code)]

use clap::Parser;
use sck_harness::report::{render_text, write_run_report};
use sck_harness::{ExecutionMode, HarnessConfig, HarnessError, RunOptions, run_batch};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Run simulator regression tests and verify their results.
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
#[command(name = "run_regression_gate", version, about, long_about = None)]
struct Cli {
    /// Include canary tests, which are expected to fail
    #[arg(long)]
    canaries: bool,

    /// Run tests one at a time instead of across all cores
    #[arg(long)]
    serial: bool,

    /// Directory of test definition files [default: tests]
    #[arg(long, env = "SIMCHECK_TESTS_DIR")]
    tests_dir: Option<PathBuf>,

    /// Root directory the simulator runs from [default: inputs]
    #[arg(long, env = "SIMCHECK_INPUTS_DIR")]
    inputs_dir: Option<PathBuf>,

    /// Simulator executable [default: ../build/mpmc]
    #[arg(long, env = "SIMCHECK_SIMULATOR")]
    simulator: Option<PathBuf>,

    /// Seconds before a running simulator is killed; 0 waits forever
    #[arg(long, env = "SIMCHECK_TIMEOUT_SECS", default_value_t = 600)]
    timeout_secs: u64,

    /// Only run tests whose name contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Append one JSON line per test outcome to this file
    #[arg(long, env = "SIMCHECK_VERDICT_LOG_PATH")]
    verdict_log: Option<PathBuf>,

    /// Keep simulator artifacts instead of deleting them after the run
    #[arg(long)]
    no_cleanup: bool,

    /// Exit with status 2 when any test fails or is skipped
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn harness_config(&self) -> HarnessConfig {
        let defaults = HarnessConfig::default_paths();
        HarnessConfig {
            tests_root: self.tests_dir.clone().unwrap_or(defaults.tests_root),
            inputs_root: self.inputs_dir.clone().unwrap_or(defaults.inputs_root),
            simulator: self.simulator.clone().unwrap_or(defaults.simulator),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            cleanup: !self.no_cleanup,
            verdict_log: self.verdict_log.clone(),
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: ExecutionMode::from_serial_flag(self.serial),
            include_canaries: self.canaries,
            name_filter: self.filter.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(&cli) {
        eprintln!("run_regression_gate failed: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), HarnessError> {
    let config = cli.harness_config();
    let report = run_batch(&config, &cli.run_options())?;

    print!("{}", render_text(&report));
    if let Some(path) = &cli.report {
        write_run_report(path, &report)?;
        println!("wrote {}", path.display());
    }

    if cli.strict && !report.all_passed() {
        std::process::exit(2);
    }
    Ok(())
}
