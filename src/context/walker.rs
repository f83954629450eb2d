use crate::error::{BuildError, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Walk `root` and return every non-directory entry in traversal order.
///
/// Symlinks are not followed; a link is listed like a file. Any walk error
/// aborts the scan. The order is whatever the filesystem yields, so callers
/// must not rely on it for anything but display.
pub fn scan(root: &Path, cancel: &CancellationToken) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    scan_into(root, cancel, &mut files)?;
    Ok(files)
}

/// Same walk as [`scan`], appending to an existing list.
pub(crate) fn scan_into(
    root: &Path,
    cancel: &CancellationToken,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let entry = entry.map_err(|err| walk_error(root, err))?;
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }
    Ok(())
}

/// Most recent modification time of any entry under `root`, the root included.
pub fn last_modified(root: &Path, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
    let mut latest: Option<DateTime<Utc>> = None;
    for entry in WalkDir::new(root).follow_links(false) {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let entry = entry.map_err(|err| walk_error(root, err))?;
        let modified = entry
            .metadata()
            .map_err(|err| walk_error(root, err))?
            .modified()
            .map_err(|source| BuildError::FilesystemWalk {
                path: entry.path().to_path_buf(),
                source,
            })?;
        let modified = DateTime::<Utc>::from(modified);
        if latest.map_or(true, |current| modified > current) {
            latest = Some(modified);
        }
    }
    Ok(latest.unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH)))
}

fn walk_error(root: &Path, err: walkdir::Error) -> BuildError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    BuildError::FilesystemWalk {
        path,
        source: err.into(),
    }
}
