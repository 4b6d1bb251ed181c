#![forbid(unsafe_code)]

//! Removes files the simulator leaves behind when an input script forgets to
//! send them to /dev/null.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ARTIFACT_PATTERNS: [&str; 6] = [
    "*.dat",
    "*.last",
    "*.restart.*",
    "*.traj*",
    "*.energy*",
    "*.final*",
];

/// Deletes artifact files directly inside each directory and returns how many
/// were removed. Failures are logged and otherwise ignored.
pub fn remove_artifacts<'a>(dirs: impl IntoIterator<Item = &'a Path>) -> usize {
    let unique: BTreeSet<PathBuf> = dirs.into_iter().map(Path::to_path_buf).collect();
    let mut removed = 0;

    for dir in unique {
        let prefix = glob::Pattern::escape(&dir.to_string_lossy());
        for pattern in ARTIFACT_PATTERNS {
            let full = format!("{prefix}/{pattern}");
            let paths = match glob::glob(&full) {
                Ok(paths) => paths,
                Err(err) => {
                    warn!(pattern = %full, error = %err, "invalid cleanup pattern");
                    continue;
                }
            };
            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => match fs::remove_file(&path) {
                        Ok(()) => {
                            debug!(file = %path.display(), "removed simulator artifact");
                            removed += 1;
                        }
                        Err(err) => {
                            warn!(file = %path.display(), error = %err, "failed to remove artifact");
                        }
                    },
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "unreadable cleanup candidate"),
                }
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::remove_artifacts;
    use std::fs;

    #[test]
    fn removes_only_matching_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        for name in [
            "run.dat",
            "run.last",
            "run.restart.3",
            "run.traj.xyz",
            "run.energy",
            "run.final.pqr",
            "input.inp",
            "structure.pqr",
        ] {
            fs::write(root.join(name), b"x").expect("write file");
        }
        fs::create_dir(root.join("keep.dat")).expect("directories are left alone");

        let removed = remove_artifacts([root, root]);
        assert_eq!(removed, 6);
        assert!(root.join("input.inp").exists());
        assert!(root.join("structure.pqr").exists());
        assert!(root.join("keep.dat").is_dir());
        assert!(!root.join("run.dat").exists());
    }

    #[test]
    fn missing_directory_is_harmless() {
        let removed = remove_artifacts([std::path::Path::new("/nonexistent/simcheck/inputs")]);
        assert_eq!(removed, 0);
    }
}
