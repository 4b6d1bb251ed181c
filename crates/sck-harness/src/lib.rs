#![forbid(unsafe_code)]

pub mod cleanup;
pub mod error;
pub mod extractor;
pub mod process_runner;
pub mod report;
pub mod scheduler;
pub mod spec_loader;

pub use crate::error::{ExtractError, HarnessError, Result, RunError};
pub use crate::process_runner::{RunnerSettings, SimulatorGate};
pub use crate::scheduler::{BatchReport, ExecutionMode, RunOptions, TestOutcome, TestState};
pub use crate::spec_loader::{SearchMode, TestCase};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory of test definition files.
    pub tests_root: PathBuf,
    /// Root every test's working directory is resolved against.
    pub inputs_root: PathBuf,
    pub simulator: PathBuf,
    /// Per-test bound on the simulator's run time; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Remove simulator artifacts after the batch.
    pub cleanup: bool,
    /// Append one JSON line per outcome to this file.
    pub verdict_log: Option<PathBuf>,
}

impl HarnessConfig {
    /// Layout of a checkout run from the harness directory: definitions in
    /// `tests/`, inputs in `inputs/`, and the simulator built one level up.
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            tests_root: PathBuf::from("tests"),
            inputs_root: PathBuf::from("inputs"),
            simulator: PathBuf::from("../build/mpmc"),
            timeout: Some(DEFAULT_TIMEOUT),
            cleanup: true,
            verdict_log: None,
        }
    }

    #[must_use]
    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            inputs_root: self.inputs_root.clone(),
            timeout: self.timeout,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

/// Loads every definition, runs the batch, and tidies up afterwards.
///
/// A malformed definition or a missing simulator fails before any test runs.
pub fn run_batch(config: &HarnessConfig, options: &RunOptions) -> Result<BatchReport> {
    let cases = spec_loader::load_test_cases(&config.tests_root)?;
    info!(count = cases.len(), tests_root = %config.tests_root.display(), "loaded test definitions");

    let mut work_dirs: Vec<PathBuf> = vec![config.inputs_root.clone()];
    work_dirs.extend(cases.iter().map(|case| case.working_dir(&config.inputs_root)));

    let gate = SimulatorGate::new(&config.simulator);
    let report = scheduler::run_tests(cases, &gate, &config.runner_settings(), options)?;

    if let Some(path) = &config.verdict_log {
        append_verdict_log(path, &report);
    }
    if config.cleanup {
        let removed = cleanup::remove_artifacts(work_dirs.iter().map(PathBuf::as_path));
        info!(removed, "cleaned up simulator artifacts");
    }

    info!(
        passed = report.passed(),
        failed = report.failed(),
        skipped = report.skipped(),
        excluded = report.excluded(),
        total_secs = report.total_duration.as_secs_f64(),
        "batch finished"
    );
    Ok(report)
}

fn append_verdict_log(path: &Path, report: &BatchReport) {
    for outcome in &report.outcomes {
        if let Err(err) = report::append_verdict_log(path, outcome) {
            warn!(log = %path.display(), error = %err, "failed appending verdict log");
            return;
        }
    }
}
