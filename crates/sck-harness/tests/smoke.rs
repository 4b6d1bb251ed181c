#![cfg(unix)]

mod common;

use common::{fixture_config, fixture_root};
use sck_harness::{ExecutionMode, RunOptions, TestState, run_batch};

#[test]
fn fixture_suite_passes_in_both_modes() {
    let cfg = fixture_config();
    assert!(fixture_root().join("tests/energy_forward").exists());

    let serial = run_batch(&cfg, &RunOptions::new(ExecutionMode::Sequential))
        .expect("fixture suite should execute");
    let concurrent = run_batch(&cfg, &RunOptions::new(ExecutionMode::Concurrent { workers: 4 }))
        .expect("fixture suite should execute");

    for report in [&serial, &concurrent] {
        assert_eq!(report.outcomes.len(), 5);
        assert_eq!(report.passed(), 4, "{:?}", report.outcomes);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.skipped(), 0);
        assert_eq!(report.excluded(), 1);
        assert_eq!(report.ledger.verdicts().len(), 4);
    }

    let serial_states: Vec<_> = serial.outcomes.iter().map(|o| (&o.name, o.state)).collect();
    let concurrent_states: Vec<_> = concurrent.outcomes.iter().map(|o| (&o.name, o.state)).collect();
    assert_eq!(serial_states, concurrent_states);
}

#[test]
fn canary_runs_and_fails_when_requested() {
    let cfg = fixture_config();

    let default_run = run_batch(&cfg, &RunOptions::new(ExecutionMode::Sequential))
        .expect("fixture suite should execute");
    let canary = default_run
        .outcome("canary_always_fails")
        .expect("canary is reported");
    assert_eq!(canary.state, TestState::Excluded);
    assert!(canary.verdict.is_none());
    assert!(canary.duration.is_zero());

    let mut options = RunOptions::new(ExecutionMode::Sequential);
    options.include_canaries = true;
    let with_canaries = run_batch(&cfg, &options).expect("fixture suite should execute");
    let canary = with_canaries
        .outcome("canary_always_fails")
        .expect("canary is reported");
    assert_eq!(canary.state, TestState::Failed);
    assert_eq!(with_canaries.failed(), 1);
    assert_eq!(with_canaries.excluded(), 0);
}

#[test]
fn reverse_search_uses_last_matching_line() {
    let report = run_batch(&fixture_config(), &RunOptions::new(ExecutionMode::Sequential))
        .expect("fixture suite should execute");
    let outcome = report.outcome("energy_reverse").expect("reverse case");
    let verdict = outcome.verdict.as_ref().expect("verdict recorded");
    assert_eq!(verdict.actual, "7.504");
    assert_eq!(outcome.state, TestState::Passed);
}
