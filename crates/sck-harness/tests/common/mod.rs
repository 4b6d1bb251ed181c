#![allow(dead_code)]

use sck_harness::HarnessConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// `/bin/sh` stands in for the simulator: each input file is a shell script
/// printing the output a real run would produce.
pub const FAKE_SIMULATOR: &str = "/bin/sh";

pub fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

pub fn fixture_config() -> HarnessConfig {
    let root = fixture_root();
    HarnessConfig {
        tests_root: root.join("tests"),
        inputs_root: root.join("inputs"),
        simulator: PathBuf::from(FAKE_SIMULATOR),
        timeout: Some(Duration::from_secs(30)),
        cleanup: false,
        verdict_log: None,
    }
}

/// Scratch harness layout with `tests/` and `inputs/` directories.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir should be created");
        fs::create_dir(dir.path().join("tests")).expect("tests dir");
        fs::create_dir(dir.path().join("inputs")).expect("inputs dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.root().join("tests")
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.root().join("inputs")
    }

    pub fn definition(&self, file: &str, body: &str) {
        fs::write(self.tests_dir().join(file), body).expect("definition written");
    }

    /// Writes an input script below `inputs/`, creating subfolders.
    pub fn input(&self, relative: &str, body: &str) {
        let path = self.inputs_dir().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("input folder");
        }
        fs::write(path, body).expect("input written");
    }

    /// Defines a test whose input script prints `output` and then exits.
    pub fn simple_test(&self, name: &str, output: &str, expected: &str, precision: &str) {
        let input = format!("{name}.sh");
        self.definition(
            name,
            &format!("name {name}\ninput {input}\nterm Result\noutput {expected}\nprecision {precision}\n"),
        );
        self.input(&input, &format!("touch {name}.ran\necho \"Result {output}\"\n"));
    }

    pub fn ran(&self, name: &str) -> bool {
        self.inputs_dir().join(format!("{name}.ran")).exists()
    }

    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            tests_root: self.tests_dir(),
            inputs_root: self.inputs_dir(),
            simulator: PathBuf::from(FAKE_SIMULATOR),
            timeout: Some(Duration::from_secs(30)),
            cleanup: true,
            verdict_log: None,
        }
    }
}
