#![forbid(unsafe_code)]

use crate::error::{HarnessError, Result};
use sck_verdict::{Precision, parse_value};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Names containing this marker (any case) are canaries: tests built to fail
/// so the failure path of the harness itself gets exercised.
pub const CANARY_MARKER: &str = "canary";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Forward,
    Reverse,
}

impl SearchMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "forward" => Some(Self::Forward),
            "reverse" => Some(Self::Reverse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub name: String,
    /// Subfolder of the inputs root the simulator runs from.
    pub folder: Option<PathBuf>,
    pub input_file: String,
    /// Structure file reference, kept verbatim for the input script.
    pub pqr: Option<String>,
    pub search_string: String,
    pub search_mode: SearchMode,
    pub expected_result: String,
    pub precision: Precision,
    /// Wall time of the last simulator invocation.
    pub duration: Duration,
    /// Definition file this case came from.
    pub source: PathBuf,
}

impl TestCase {
    #[must_use]
    pub fn is_canary(&self) -> bool {
        self.name.to_lowercase().contains(CANARY_MARKER)
    }

    #[must_use]
    pub fn working_dir(&self, inputs_root: &Path) -> PathBuf {
        match &self.folder {
            Some(folder) => inputs_root.join(folder),
            None => inputs_root.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecKey {
    Name,
    Folder,
    Input,
    Pqr,
    Term,
    Output,
    Precision,
    Search,
}

impl SpecKey {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "name" => Some(Self::Name),
            "folder" => Some(Self::Folder),
            "input" => Some(Self::Input),
            "pqr" => Some(Self::Pqr),
            "term" => Some(Self::Term),
            "output" => Some(Self::Output),
            "precision" => Some(Self::Precision),
            "search" => Some(Self::Search),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PartialCase {
    name: Option<String>,
    folder: Option<String>,
    input: Option<String>,
    pqr: Option<String>,
    term: Option<String>,
    output: Option<String>,
    precision: Option<String>,
    search: Option<String>,
}

impl PartialCase {
    fn set(&mut self, key: SpecKey, value: String) {
        let slot = match key {
            SpecKey::Name => &mut self.name,
            SpecKey::Folder => &mut self.folder,
            SpecKey::Input => &mut self.input,
            SpecKey::Pqr => &mut self.pqr,
            SpecKey::Term => &mut self.term,
            SpecKey::Output => &mut self.output,
            SpecKey::Precision => &mut self.precision,
            SpecKey::Search => &mut self.search,
        };
        *slot = Some(value);
    }

    fn finish(self, source: &Path) -> Result<TestCase> {
        let require = |value: Option<String>, key: &'static str| {
            value.ok_or_else(|| HarnessError::MissingField {
                path: source.to_path_buf(),
                key,
            })
        };

        let name = require(self.name, "name")?;
        let input_file = require(self.input, "input")?;
        let search_string = require(self.term, "term")?;
        let expected_result = require(self.output, "output")?;
        let raw_precision = require(self.precision, "precision")?;

        let precision: Precision = raw_precision
            .parse()
            .map_err(|err| HarnessError::invalid_value(source, "precision", format!("{err}")))?;
        parse_value("expected", &expected_result)
            .map_err(|err| HarnessError::invalid_value(source, "output", format!("{err}")))?;
        let search_mode = match self.search.as_deref() {
            None => SearchMode::Forward,
            Some(raw) => SearchMode::parse(raw).ok_or_else(|| {
                HarnessError::invalid_value(
                    source,
                    "search",
                    format!("`{raw}` is neither forward nor reverse"),
                )
            })?,
        };

        Ok(TestCase {
            name,
            folder: self.folder.map(PathBuf::from),
            input_file,
            pqr: self.pqr,
            search_string,
            search_mode,
            expected_result,
            precision,
            duration: Duration::ZERO,
            source: source.to_path_buf(),
        })
    }
}

/// Parses the text of one test definition file.
///
/// A line holding a single token aborts with [`HarnessError::SpecSyntax`];
/// an unknown key is logged and skipped.
pub fn parse_test_case(source: &Path, text: &str) -> Result<TestCase> {
    let mut partial = PartialCase::default();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let content = line.trim_start();
        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        let mut tokens = content.split_whitespace();
        let key_token = tokens.next().unwrap_or_default();
        if tokens.next().is_none() {
            return Err(HarnessError::SpecSyntax {
                path: source.to_path_buf(),
                line: line_no,
                content: line.to_string(),
            });
        }

        let Some(key) = SpecKey::from_token(key_token) else {
            warn!(
                file = %source.display(),
                line = line_no,
                key = key_token,
                "unsupported option in test definition, ignoring"
            );
            continue;
        };

        let rest = content[key_token.len()..].trim_start();
        let value = if key == SpecKey::Pqr {
            rest.to_string()
        } else {
            rest.trim_end().to_string()
        };
        partial.set(key, value);
    }

    partial.finish(source)
}

/// Loads one test case per regular file in `dir`, in file-name order.
///
/// Any malformed file fails the whole load; no partial batch is returned.
pub fn load_test_cases(dir: &Path) -> Result<Vec<TestCase>> {
    let unreadable = |source: std::io::Error| HarnessError::UnreadableSpec {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut cases = Vec::with_capacity(paths.len());
    for path in paths {
        let text = fs::read_to_string(&path).map_err(|source| HarnessError::UnreadableSpec {
            path: path.clone(),
            source,
        })?;
        let case = parse_test_case(&path, &text)?;
        debug!(test = %case.name, file = %path.display(), "loaded test definition");
        cases.push(case);
    }
    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::{SearchMode, TestCase, load_test_cases, parse_test_case};
    use crate::error::HarnessError;
    use sck_verdict::{Precision, Relation};
    use std::fs;
    use std::path::{Path, PathBuf};

    const FULL: &str = "\
# energy regression
name uvt_energy
folder uvt
input uvt.inp
pqr  structure.pqr  trailing
term potential energy
output -12.5
precision 0.01
search reverse
";

    fn parse(text: &str) -> Result<TestCase, HarnessError> {
        parse_test_case(Path::new("tests/case"), text)
    }

    #[test]
    fn parses_every_recognized_key() {
        let case = parse(FULL).expect("definition should parse");
        assert_eq!(case.name, "uvt_energy");
        assert_eq!(case.folder, Some(PathBuf::from("uvt")));
        assert_eq!(case.input_file, "uvt.inp");
        assert_eq!(case.pqr.as_deref(), Some("structure.pqr  trailing"));
        assert_eq!(case.search_string, "potential energy");
        assert_eq!(case.expected_result, "-12.5");
        assert_eq!(case.precision, Precision::Tolerance(0.01));
        assert_eq!(case.search_mode, SearchMode::Reverse);
        assert!(!case.is_canary());
    }

    #[test]
    fn key_order_is_irrelevant() {
        let mut lines: Vec<&str> = FULL.lines().collect();
        lines.reverse();
        let shuffled = lines.join("\n");
        assert_eq!(
            parse(&shuffled).expect("reversed order"),
            parse(FULL).expect("original order")
        );
    }

    #[test]
    fn defaults_apply_to_optional_keys() {
        let case = parse("name a\ninput a.inp\nterm E\noutput 1\nprecision exact\n")
            .expect("minimal definition");
        assert_eq!(case.folder, None);
        assert_eq!(case.pqr, None);
        assert_eq!(case.search_mode, SearchMode::Forward);
        assert_eq!(case.precision, Precision::Exact);
        assert_eq!(case.working_dir(Path::new("inputs")), PathBuf::from("inputs"));
    }

    #[test]
    fn comment_lines_are_skipped_even_when_indented() {
        let text = "# top note\nname a\n   # indented note\n\t#tabbed\ninput a.inp\n  #\nterm E\noutput 1\nprecision exact\n";
        let case = parse(text).expect("comments are not single-token syntax errors");
        assert_eq!(case.name, "a");
        assert_eq!(case.input_file, "a.inp");
    }

    #[test]
    fn pqr_keeps_trailing_content() {
        let case = parse("name a\ninput a\npqr  a.pqr \t\nterm E\noutput 1\nprecision exact\n")
            .expect("definition with pqr");
        assert_eq!(case.pqr.as_deref(), Some("a.pqr \t"));
    }

    #[test]
    fn single_token_line_is_fatal() {
        let err = parse("name a\ninput\nterm E\noutput 1\nprecision exact\n")
            .expect_err("lone key must fail");
        match err {
            HarnessError::SpecSyntax { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "input");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_key_is_skipped() {
        let case = parse("name a\ncolour blue\ninput a.inp\nterm E\noutput 1\nprecision more\n")
            .expect("unknown key should only warn");
        assert_eq!(case.precision, Precision::Directional(Relation::More));
    }

    #[test]
    fn key_must_match_whole_token() {
        // "input_name" used to be picked up as `name` by substring matching.
        let err = parse("input_name x\ninput a.inp\nterm E\noutput 1\nprecision exact\n")
            .expect_err("name is still missing");
        assert!(matches!(err, HarnessError::MissingField { key: "name", .. }));
    }

    #[test]
    fn missing_required_field_is_fatal() {
        let err = parse("name a\ninput a.inp\nterm E\noutput 1\n").expect_err("no precision");
        assert!(matches!(
            err,
            HarnessError::MissingField {
                key: "precision",
                ..
            }
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_precision_and_search_are_fatal() {
        let err = parse("name a\ninput a\nterm E\noutput 1\nprecision -1\n")
            .expect_err("negative tolerance");
        assert!(matches!(err, HarnessError::InvalidValue { key: "precision", .. }));

        let err = parse("name a\ninput a\nterm E\noutput 1\nprecision exact\nsearch sideways\n")
            .expect_err("bad search mode");
        assert!(matches!(err, HarnessError::InvalidValue { key: "search", .. }));

        let err = parse("name a\ninput a\nterm E\noutput lots\nprecision exact\n")
            .expect_err("non-numeric expected value");
        assert!(matches!(err, HarnessError::InvalidValue { key: "output", .. }));
    }

    #[test]
    fn canary_detection_ignores_case() {
        let case = parse("name Canary_always_fails\ninput a\nterm E\noutput 1\nprecision exact\n")
            .expect("canary definition");
        assert!(case.is_canary());
    }

    #[test]
    fn loads_directory_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("b_test"),
            "name second\ninput b\nterm E\noutput 2\nprecision exact\n",
        )
        .expect("write b");
        fs::write(
            dir.path().join("a_test"),
            "name first\ninput a\nterm E\noutput 1\nprecision exact\n",
        )
        .expect("write a");
        fs::create_dir(dir.path().join("nested")).expect("subdir is ignored");

        let cases = load_test_cases(dir.path()).expect("directory loads");
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn one_broken_file_fails_the_whole_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("good"),
            "name good\ninput a\nterm E\noutput 1\nprecision exact\n",
        )
        .expect("write good");
        fs::write(dir.path().join("bad"), "name bad\nterm\n").expect("write bad");

        let err = load_test_cases(dir.path()).expect_err("broken file aborts load");
        assert!(matches!(err, HarnessError::SpecSyntax { .. }));
    }

    #[test]
    fn missing_directory_is_reported() {
        let err = load_test_cases(Path::new("/nonexistent/simcheck/tests"))
            .expect_err("no directory");
        assert!(matches!(err, HarnessError::UnreadableSpec { .. }));
    }
}
