use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Remove every path in `ignored` from `all`, keeping the order of `all`.
///
/// Paths are compared as-is, so both lists must share one representation
/// (both rooted at the same context path, for instance).
pub fn difference(all: Vec<PathBuf>, ignored: &[PathBuf]) -> Vec<PathBuf> {
    if ignored.is_empty() {
        return all;
    }
    let ignored: HashSet<&Path> = ignored.iter().map(PathBuf::as_path).collect();
    all.into_iter()
        .filter(|path| !ignored.contains(path.as_path()))
        .collect()
}
