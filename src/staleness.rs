use crate::context::walker;
use crate::engine::{BuildEngine, ImageMetadata};
use crate::error::{BuildError, EngineError, Result};
use crate::record::{self, StoredRecord};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Why an image needs rebuilding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// The engine has no image under the name
    ImageMissing,
    /// No usable record, and the image predates the newest context change
    ImageOlderThanContext,
    /// The record points at a different image than the engine has
    ImageChanged,
    /// The record predates the newest context change
    RecordOlderThanContext,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImageMissing => write!(f, "image does not exist"),
            Self::ImageOlderThanContext => write!(f, "image older than context"),
            Self::ImageChanged => write!(f, "image differs from build record"),
            Self::RecordOlderThanContext => write!(f, "image record older than context"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    Stale(StaleReason),
}

impl Verdict {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Decide whether `image` still reflects a context last modified at
/// `context_mtime`. Equal timestamps count as fresh.
pub fn decide(
    image: &ImageMetadata,
    context_mtime: DateTime<Utc>,
    record: Option<&StoredRecord>,
) -> Verdict {
    match record {
        None => {
            if image.created < context_mtime {
                Verdict::Stale(StaleReason::ImageOlderThanContext)
            } else {
                Verdict::Fresh
            }
        }
        Some(stored) if stored.record.image_id != image.id => {
            Verdict::Stale(StaleReason::ImageChanged)
        }
        Some(stored) if stored.modified < context_mtime => {
            Verdict::Stale(StaleReason::RecordOlderThanContext)
        }
        Some(_) => Verdict::Fresh,
    }
}

/// Check whether the image named `image_name` must be rebuilt.
///
/// An error always means "treat as stale"; the caller decides whether it is
/// fatal. A missing or unreadable record only degrades the check to comparing
/// the image creation time with the context.
pub async fn check(
    engine: &dyn BuildEngine,
    image_name: &str,
    context_root: &Path,
    record_path: &Path,
    cancel: &CancellationToken,
) -> Result<Verdict> {
    let image = match engine.lookup_image(image_name).await {
        Ok(image) => image,
        Err(EngineError::NoSuchImage(_)) => {
            tracing::debug!(image = %image_name, "Image does not exist");
            return Ok(Verdict::Stale(StaleReason::ImageMissing));
        }
        Err(source) => {
            return Err(BuildError::EngineLookup {
                image: image_name.to_string(),
                source,
            })
        }
    };

    let root = context_root.to_path_buf();
    let token = cancel.clone();
    let context_mtime =
        tokio::task::spawn_blocking(move || walker::last_modified(&root, &token))
            .await
            .map_err(|err| BuildError::TaskJoin(err.to_string()))?
            .map_err(|err| {
                tracing::warn!(context = %context_root.display(), "Failed to get last modified time of context");
                err
            })?;

    let record = match record::read_record(record_path) {
        Ok(stored) => Some(stored),
        Err(err) => {
            BuildError::RecordRead(err).downgrade("Failed to get image record")?;
            None
        }
    };

    let verdict = decide(&image, context_mtime, record.as_ref());
    if let Verdict::Stale(reason) = verdict {
        tracing::debug!(image = %image_name, %reason, "Image is stale");
    }
    Ok(verdict)
}
