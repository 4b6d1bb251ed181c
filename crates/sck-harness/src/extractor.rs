#![forbid(unsafe_code)]

use crate::error::ExtractError;
use crate::spec_loader::{SearchMode, TestCase};
use regex::Regex;
use std::sync::OnceLock;

/// Optional sign, ASCII digits with an optional fraction (or a bare fraction),
/// then an optional signed exponent.
const NUMERIC_PATTERN: &str = r"[-+]?(?:[0-9]*\.[0-9]+|[0-9]+\.?)(?:[Ee][+-]?[0-9]+)?";

fn numeric_regex() -> &'static Regex {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    NUMERIC.get_or_init(|| Regex::new(NUMERIC_PATTERN).expect("numeric pattern is valid"))
}

/// First numeric token on `line`, if any.
#[must_use]
pub fn first_number(line: &str) -> Option<&str> {
    numeric_regex().find(line).map(|m| m.as_str())
}

/// Pulls the result for `case` out of the simulator's stdout.
///
/// Only the first line containing the search term is considered (the last one
/// in reverse mode). The simulator cannot report a step-zero baseline without
/// also printing the first step, so the earliest match is the one that counts.
pub fn extract_result(output: &str, case: &TestCase) -> Result<String, ExtractError> {
    let term = case.search_string.as_str();
    let matched = match case.search_mode {
        SearchMode::Forward => output.lines().find(|line| line.contains(term)),
        SearchMode::Reverse => output.lines().rev().find(|line| line.contains(term)),
    };

    let line = matched.ok_or_else(|| ExtractError::TermNotFound {
        term: term.to_string(),
    })?;
    first_number(line)
        .map(str::to_string)
        .ok_or_else(|| ExtractError::NoNumericToken {
            line: line.to_string(),
        })
}
