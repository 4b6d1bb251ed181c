#![forbid(unsafe_code)]

//! Tolerance policies for simulator results and the ledger of verdicts they
//! produce.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Directional relation the actual value must hold against the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Strictly below.
    Less,
    /// Strictly above.
    More,
    /// Below or equal.
    Lesser,
    /// Above or equal.
    Greater,
}

impl Relation {
    #[must_use]
    pub fn holds(self, expected: f64, actual: f64) -> bool {
        match self {
            Self::Less => actual < expected,
            Self::More => actual > expected,
            Self::Lesser => actual <= expected,
            Self::Greater => actual >= expected,
        }
    }

    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Less => "less",
            Self::More => "more",
            Self::Lesser => "lesser",
            Self::Greater => "greater",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Precision {
    Exact,
    Tolerance(f64),
    Directional(Relation),
}

impl Precision {
    /// Absolute tolerance for non-directional policies.
    #[must_use]
    pub fn tolerance(self) -> Option<f64> {
        match self {
            Self::Exact => Some(0.0),
            Self::Tolerance(tol) => Some(tol),
            Self::Directional(_) => None,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Tolerance(tol) => write!(f, "{tol}"),
            Self::Directional(relation) => f.write_str(relation.keyword()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrecisionError {
    #[error("precision `{0}` is neither exact, a directional qualifier, nor a number")]
    Unrecognized(String),
    #[error("precision `{0}` must be a finite, non-negative tolerance")]
    OutOfRange(String),
}

impl FromStr for Precision {
    type Err = PrecisionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        match trimmed {
            "exact" => Ok(Self::Exact),
            "less" => Ok(Self::Directional(Relation::Less)),
            "more" => Ok(Self::Directional(Relation::More)),
            "lesser" => Ok(Self::Directional(Relation::Lesser)),
            "greater" => Ok(Self::Directional(Relation::Greater)),
            other => {
                let tol: f64 = other
                    .parse()
                    .map_err(|_| PrecisionError::Unrecognized(other.to_string()))?;
                if tol.is_finite() && tol >= 0.0 {
                    Ok(Self::Tolerance(tol))
                } else {
                    Err(PrecisionError::OutOfRange(other.to_string()))
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{role} value `{raw}` is not a number")]
pub struct ValueError {
    pub role: &'static str,
    pub raw: String,
}

/// Parses a raw result string as used by test definitions and simulator output.
pub fn parse_value(role: &'static str, raw: &str) -> Result<f64, ValueError> {
    raw.trim().parse().map_err(|_| ValueError {
        role,
        raw: raw.to_string(),
    })
}

/// Decides whether `actual` satisfies `precision` against `expected`.
///
/// Directional qualifiers take priority; every other policy is an absolute
/// tolerance on `actual - expected`, inclusive at the boundary.
#[must_use]
pub fn satisfies(precision: Precision, expected: f64, actual: f64) -> bool {
    match precision {
        Precision::Directional(relation) => relation.holds(expected, actual),
        Precision::Exact | Precision::Tolerance(_) => {
            let tol = precision.tolerance().unwrap_or(0.0);
            (actual - expected).abs() <= tol
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub ts_millis: u128,
    pub test_name: String,
    pub status: VerdictStatus,
    pub duration_secs: f64,
    pub expected: String,
    pub actual: String,
    pub precision: Precision,
    /// `actual - expected`; absent for directional policies.
    pub delta: Option<f64>,
}

impl Verdict {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == VerdictStatus::Passed
    }
}

/// Judges one extracted value and builds the verdict record.
pub fn verify(
    test_name: &str,
    expected: &str,
    actual: &str,
    precision: Precision,
    duration: Duration,
) -> Result<Verdict, ValueError> {
    let expected_value = parse_value("expected", expected)?;
    let actual_value = parse_value("actual", actual)?;

    let status = if satisfies(precision, expected_value, actual_value) {
        VerdictStatus::Passed
    } else {
        VerdictStatus::Failed
    };
    let delta = precision
        .tolerance()
        .map(|_| actual_value - expected_value);
    let ts_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());

    Ok(Verdict {
        ts_millis,
        test_name: test_name.to_string(),
        status,
        duration_secs: duration.as_secs_f64(),
        expected: expected.trim().to_string(),
        actual: actual.trim().to_string(),
        precision,
        delta,
    })
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct VerdictLedger {
    verdicts: Vec<Verdict>,
}

impl VerdictLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, verdict: Verdict) {
        self.verdicts.push(verdict);
    }

    #[must_use]
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    #[must_use]
    pub fn last(&self) -> Option<&Verdict> {
        self.verdicts.last()
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.passed()).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.verdicts.len() - self.passed_count()
    }
}
