#![forbid(unsafe_code)]

use crate::error::Result;
use crate::extractor::extract_result;
use crate::process_runner::{RunnerSettings, SimulatorGate, run_simulator};
use crate::spec_loader::TestCase;
use sck_verdict::{Verdict, VerdictLedger, verify};
use serde::{Serialize, Serializer};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    Sequential,
    Concurrent { workers: usize },
}

impl ExecutionMode {
    /// Concurrent across every available processing unit.
    #[must_use]
    pub fn concurrent() -> Self {
        let workers = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::Concurrent { workers }
    }

    #[must_use]
    pub fn from_serial_flag(serial: bool) -> Self {
        if serial {
            Self::Sequential
        } else {
            Self::concurrent()
        }
    }

    #[must_use]
    pub fn worker_count(self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Concurrent { workers } => workers.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: ExecutionMode,
    pub include_canaries: bool,
    /// Only cases whose name contains this substring are dispatched.
    pub name_filter: Option<String>,
}

impl RunOptions {
    #[must_use]
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            include_canaries: false,
            name_filter: None,
        }
    }
}

/// Lifecycle of one case: `Pending -> Running -> {Passed, Failed, Skipped}`.
///
/// `Excluded` cases are filtered before dispatch and never run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
    Excluded,
}

impl TestState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Passed => "PASS",
            Self::Failed => "FAIL",
            Self::Skipped => "SKIP",
            Self::Excluded => "EXCLUDED",
        }
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub name: String,
    pub state: TestState,
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub verdict: Option<Verdict>,
    /// Why a case was skipped or excluded.
    pub detail: Option<String>,
}

impl TestOutcome {
    fn skipped(case: &TestCase, detail: String) -> Self {
        Self {
            name: case.name.clone(),
            state: TestState::Skipped,
            duration: case.duration,
            verdict: None,
            detail: Some(detail),
        }
    }

    fn excluded(case: &TestCase, reason: &str) -> Self {
        Self {
            name: case.name.clone(),
            state: TestState::Excluded,
            duration: Duration::ZERO,
            verdict: None,
            detail: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub mode: ExecutionMode,
    /// One entry per loaded case, in load order.
    pub outcomes: Vec<TestOutcome>,
    #[serde(rename = "total_duration_secs", serialize_with = "serialize_secs")]
    pub total_duration: Duration,
    pub ledger: VerdictLedger,
}

impl BatchReport {
    fn count(&self, state: TestState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(TestState::Passed)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(TestState::Failed)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(TestState::Skipped)
    }

    #[must_use]
    pub fn excluded(&self) -> usize {
        self.count(TestState::Excluded)
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0 && self.skipped() == 0
    }

    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&TestOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

fn exclusion_reason(case: &TestCase, options: &RunOptions) -> Option<&'static str> {
    if case.is_canary() && !options.include_canaries {
        return Some("canary excluded");
    }
    match &options.name_filter {
        Some(filter) if !case.name.contains(filter.as_str()) => Some("filtered out"),
        _ => None,
    }
}

/// Runs one case to a terminal state: simulate, extract, verify.
///
/// Launch, exit-status, timeout, and extraction problems end in `Skipped`;
/// none of them escape as an error.
pub fn execute_case(mut case: TestCase, gate: &SimulatorGate, settings: &RunnerSettings) -> TestOutcome {
    let mut state = TestState::Pending;
    debug!(test = %case.name, ?state, "dispatched");

    let simulator = match gate.ensure() {
        Ok(path) => path,
        Err(err) => return TestOutcome::skipped(&case, err.to_string()),
    };

    state = TestState::Running;
    debug!(test = %case.name, ?state, "running simulator");
    let process = run_simulator(&case, simulator, settings);
    case.duration = process.elapsed;

    let output = match process.result {
        Ok(output) => output,
        Err(err) => {
            warn!(test = %case.name, error = %err, "subprocess returned an error, skipping test");
            return TestOutcome::skipped(&case, format!("subprocess returned an error: {err}"));
        }
    };

    let actual = match extract_result(&output, &case) {
        Ok(actual) => actual,
        Err(err) => {
            warn!(test = %case.name, error = %err, "no result in simulator output, skipping test");
            return TestOutcome::skipped(&case, err.to_string());
        }
    };

    let verdict = match verify(
        &case.name,
        &case.expected_result,
        &actual,
        case.precision,
        case.duration,
    ) {
        Ok(verdict) => verdict,
        Err(err) => {
            warn!(test = %case.name, error = %err, "result could not be compared, skipping test");
            return TestOutcome::skipped(&case, err.to_string());
        }
    };

    state = if verdict.passed() {
        TestState::Passed
    } else {
        TestState::Failed
    };
    debug!(test = %case.name, ?state, actual = %actual, "verified");

    TestOutcome {
        name: case.name,
        state,
        duration: case.duration,
        verdict: Some(verdict),
        detail: None,
    }
}

/// Runs every case and reduces the outcomes into a [`BatchReport`].
///
/// The simulator gate is checked before anything is dispatched; a missing
/// simulator fails the whole batch. Excluded cases never reach a worker.
pub fn run_tests(
    cases: Vec<TestCase>,
    gate: &SimulatorGate,
    settings: &RunnerSettings,
    options: &RunOptions,
) -> Result<BatchReport> {
    gate.ensure()?;

    let mut slots: Vec<Option<TestOutcome>> = (0..cases.len()).map(|_| None).collect();
    let mut dispatch = Vec::with_capacity(cases.len());
    for (idx, case) in cases.into_iter().enumerate() {
        match exclusion_reason(&case, options) {
            Some(reason) => {
                debug!(test = %case.name, reason, "excluded from run");
                slots[idx] = Some(TestOutcome::excluded(&case, reason));
            }
            None => dispatch.push((idx, case)),
        }
    }

    let workers = options.mode.worker_count().min(dispatch.len()).max(1);
    info!(tests = dispatch.len(), workers, "dispatching tests");
    for (idx, outcome) in run_pool(dispatch, workers, gate, settings) {
        slots[idx] = Some(outcome);
    }

    let mut outcomes = Vec::with_capacity(slots.len());
    let mut ledger = VerdictLedger::new();
    let mut total_duration = Duration::ZERO;
    for outcome in slots.into_iter().flatten() {
        total_duration += outcome.duration;
        if let Some(verdict) = &outcome.verdict {
            ledger.record(verdict.clone());
        }
        outcomes.push(outcome);
    }

    Ok(BatchReport {
        mode: options.mode,
        outcomes,
        total_duration,
        ledger,
    })
}

fn run_pool(
    jobs: Vec<(usize, TestCase)>,
    workers: usize,
    gate: &SimulatorGate,
    settings: &RunnerSettings,
) -> Vec<(usize, TestOutcome)> {
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, TestCase)>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, TestOutcome)>();
    for job in jobs {
        // The receiver is alive until the scope below ends.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                for (idx, case) in job_rx.iter() {
                    debug!(worker, test = %case.name, "worker picked test");
                    let outcome = execute_case(case, gate, settings);
                    if done_tx.send((idx, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(done_tx);

    done_rx.try_iter().collect()
}
