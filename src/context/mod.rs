pub mod archive;
pub mod diff;
pub mod ignore;
pub mod join;
pub mod walker;

pub use archive::ArchivePacker;
pub use diff::difference;
pub use ignore::resolve_ignored;
pub use join::{join_ordered, Producer};
pub use walker::{last_modified, scan};

use crate::error::{BuildError, Result};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Compute the build context: everything under `root` minus whatever the
/// ignore sources resolve to. The scan and the ignore resolution run
/// concurrently; a scan error is reported before an ignore error.
pub async fn assemble(
    root: &Path,
    ignore_sources: Vec<PathBuf>,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let scan_root = root.to_path_buf();
    let producers: Vec<Producer<Vec<PathBuf>>> = vec![
        Box::new(move |token: &CancellationToken| scan(&scan_root, token)),
        Box::new(move |token: &CancellationToken| resolve_ignored(&ignore_sources, token)),
    ];

    let mut outputs = join_ordered(cancel, producers).await?.into_iter();
    let all = outputs.next().unwrap_or_default();
    let ignored = outputs.next().unwrap_or_default();

    tracing::debug!(
        scanned = all.len(),
        ignored = ignored.len(),
        "Resolved build context"
    );
    Ok(difference(all, &ignored))
}

/// Assemble the context under `root` and pack it behind the inline `steps`.
pub async fn pack_context(
    root: &Path,
    steps: &str,
    ignore_sources: Vec<PathBuf>,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let files = assemble(root, ignore_sources, cancel).await?;
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }

    let packer = ArchivePacker::new(root)?;
    let steps = steps.to_string();
    tokio::task::spawn_blocking(move || packer.pack_to_vec(&steps, &files))
        .await
        .map_err(|err| BuildError::TaskJoin(err.to_string()))?
}
