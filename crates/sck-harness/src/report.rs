#![forbid(unsafe_code)]

use crate::error::Result;
use crate::scheduler::{BatchReport, ExecutionMode, TestOutcome, TestState};
use sck_verdict::{Precision, Verdict};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const RUN_REPORT_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Serialize)]
struct RunReportArtifact<'a> {
    schema_version: u8,
    generated_at_unix_ms: u128,
    passed: usize,
    failed: usize,
    skipped: usize,
    excluded: usize,
    #[serde(flatten)]
    report: &'a BatchReport,
}

#[derive(Debug, Serialize)]
struct VerdictLogEntry<'a> {
    ts_millis: u128,
    test: &'a str,
    state: TestState,
    duration_secs: f64,
    expected: Option<&'a str>,
    actual: Option<&'a str>,
    precision: Option<Precision>,
    detail: Option<&'a str>,
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn failure_lines(verdict: &Verdict) -> [String; 2] {
    let expected = match verdict.precision {
        Precision::Directional(_) => format!("Expected answer: {}", verdict.expected),
        precision => format!(
            "Expected answer: {} with precision of {precision}",
            verdict.expected
        ),
    };
    [expected, format!("Actual answer: {}", verdict.actual)]
}

fn mode_label(mode: ExecutionMode) -> String {
    match mode {
        ExecutionMode::Sequential => "serial".to_string(),
        ExecutionMode::Concurrent { workers } => format!("concurrent, {workers} workers"),
    }
}

/// Plain-text report: one line per test, details for failures and skips, then
/// the aggregate summary.
#[must_use]
pub fn render_text(report: &BatchReport) -> String {
    let mut out = String::new();
    for outcome in &report.outcomes {
        match outcome.state {
            TestState::Excluded => {
                let reason = outcome.detail.as_deref().unwrap_or("excluded");
                let _ = writeln!(out, "{:<8} {} ({reason})", outcome.state.label(), outcome.name);
            }
            state => {
                let _ = writeln!(
                    out,
                    "{:<8} {} ({:.3}s)",
                    state.label(),
                    outcome.name,
                    outcome.duration.as_secs_f64()
                );
            }
        }

        if outcome.state == TestState::Failed {
            if let Some(verdict) = &outcome.verdict {
                for line in failure_lines(verdict) {
                    let _ = writeln!(out, "         {line}");
                }
            }
        }
        if outcome.state == TestState::Skipped {
            if let Some(detail) = &outcome.detail {
                let _ = writeln!(out, "         {detail}");
            }
        }
    }

    let _ = writeln!(
        out,
        "{} tests: {} passed, {} failed, {} skipped, {} excluded in {:.3}s ({})",
        report.outcomes.len(),
        report.passed(),
        report.failed(),
        report.skipped(),
        report.excluded(),
        report.total_duration.as_secs_f64(),
        mode_label(report.mode)
    );
    out
}

/// Writes the whole batch as pretty JSON, creating parent directories.
pub fn write_run_report(path: &Path, report: &BatchReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let artifact = RunReportArtifact {
        schema_version: RUN_REPORT_SCHEMA_VERSION,
        generated_at_unix_ms: now_unix_ms(),
        passed: report.passed(),
        failed: report.failed(),
        skipped: report.skipped(),
        excluded: report.excluded(),
        report,
    };
    let raw = serde_json::to_string_pretty(&artifact)?;
    fs::write(path, raw)?;
    Ok(())
}

/// Appends one JSON line describing `outcome` to the verdict log.
pub fn append_verdict_log(path: &Path, outcome: &TestOutcome) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let verdict = outcome.verdict.as_ref();
    let entry = VerdictLogEntry {
        ts_millis: verdict.map_or_else(now_unix_ms, |v| v.ts_millis),
        test: &outcome.name,
        state: outcome.state,
        duration_secs: outcome.duration.as_secs_f64(),
        expected: verdict.map(|v| v.expected.as_str()),
        actual: verdict.map(|v| v.actual.as_str()),
        precision: verdict.map(|v| v.precision),
        detail: outcome.detail.as_deref(),
    };

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut payload = serde_json::to_string(&entry)?.into_bytes();
    payload.push(b'\n');
    file.write_all(&payload)?;
    Ok(())
}
