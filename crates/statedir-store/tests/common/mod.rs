use statedir_core::StageError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Error type of a fetcher that populates staging slots in tests
#[derive(Debug)]
#[allow(dead_code)]
pub enum FetchError {
    Stage(StageError),
    Upstream(&'static str),
}

impl From<StageError> for FetchError {
    fn from(err: StageError) -> Self {
        FetchError::Stage(err)
    }
}

/// A scratch directory and a target path inside it
#[allow(dead_code)]
pub fn setup_target(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp state directory");
    let target = dir.path().join(name);
    (dir, target)
}

/// Write a map of relative path -> content under `root`
#[allow(dead_code)]
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

/// Read every file under `root` as sorted (relative path, content) pairs
#[allow(dead_code)]
pub fn read_tree(root: &Path) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect(root, root, &mut out);
    out.sort();
    out
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<(String, String)>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
            out.push((rel, fs::read_to_string(&path).unwrap()));
        }
    }
}

/// Names of entries next to the target, for asserting no debris remains
#[allow(dead_code)]
pub fn sibling_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
