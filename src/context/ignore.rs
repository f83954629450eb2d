use crate::context::walker;
use crate::error::{BuildError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Read every ignore-pattern source and resolve its patterns to the concrete
/// files they match right now.
///
/// Patterns are resolved relative to the directory holding their source
/// file. A pattern naming a path that does not exist resolves to nothing.
/// Any unreadable source or malformed pattern aborts the whole resolution.
pub fn resolve_ignored(sources: &[PathBuf], cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();
    for source in sources {
        let content = fs::read_to_string(source).map_err(|err| BuildError::IgnorePattern {
            source_file: source.clone(),
            reason: err.to_string(),
        })?;
        let base = source.parent().unwrap_or_else(|| Path::new(""));
        for pattern in parse_patterns(&content) {
            resolve_pattern(source, base, &pattern, cancel, &mut resolved)?;
        }
    }
    Ok(resolved)
}

/// Parse pattern lines, dropping blanks, comments and exception rules.
pub fn parse_patterns(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| {
            if l.starts_with('!') {
                tracing::warn!(pattern = %l, "Exception patterns are not supported, skipping");
                return false;
            }
            true
        })
        .filter_map(normalize_pattern)
        .collect()
}

/// Strip leading `/` and `./` and trailing `/` so the pattern joins cleanly
/// onto its base directory.
fn normalize_pattern(line: &str) -> Option<String> {
    let mut pattern = line.trim_start_matches('/');
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest.trim_start_matches('/');
    }
    let pattern = pattern.trim_end_matches('/');
    if pattern.is_empty() || pattern == "." {
        None
    } else {
        Some(pattern.to_string())
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

fn resolve_pattern(
    source: &Path,
    base: &Path,
    pattern: &str,
    cancel: &CancellationToken,
    resolved: &mut Vec<PathBuf>,
) -> Result<()> {
    let candidate = base.join(pattern);
    if !is_glob(pattern) {
        return walk_if_present(&candidate, cancel, resolved);
    }

    // Only the pattern is a glob; the base directory is matched literally.
    let escaped_base = glob::Pattern::escape(&base.to_string_lossy());
    let glob_path = Path::new(&escaped_base).join(pattern);
    let matches = glob::glob(&glob_path.to_string_lossy()).map_err(|err| {
        BuildError::IgnorePattern {
            source_file: source.to_path_buf(),
            reason: format!("invalid pattern {pattern:?}: {err}"),
        }
    })?;
    for entry in matches {
        let path = entry.map_err(|err| BuildError::IgnorePattern {
            source_file: source.to_path_buf(),
            reason: err.to_string(),
        })?;
        walk_if_present(&path, cancel, resolved)?;
    }
    Ok(())
}

fn walk_if_present(
    path: &Path,
    cancel: &CancellationToken,
    resolved: &mut Vec<PathBuf>,
) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => walker::scan_into(path, cancel, resolved),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BuildError::FilesystemWalk {
            path: path.to_path_buf(),
            source,
        }),
    }
}
