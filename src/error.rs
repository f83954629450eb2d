/// rebuildr error types and handling utilities
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

/// Main error type for staleness checks and context builds
#[derive(Debug, Error)]
pub enum BuildError {
    /// The engine failed to describe the image for a reason other than absence
    #[error("image lookup failed for {image}: {source}")]
    EngineLookup {
        image: String,
        #[source]
        source: EngineError,
    },
    /// A directory walk hit an unreadable entry
    #[error("failed to walk {}: {source}", .path.display())]
    FilesystemWalk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An ignore-pattern source could not be read or resolved
    #[error("ignore pattern failure in {}: {reason}", .source_file.display())]
    IgnorePattern { source_file: PathBuf, reason: String },
    /// The persisted build record could not be read
    #[error("failed to read build record: {0}")]
    RecordRead(#[source] RecordError),
    /// The persisted build record could not be written
    #[error("failed to write build record: {0}")]
    RecordWrite(#[source] RecordError),
    /// A file could not be added to the build context archive
    #[error("failed to pack {}: {source}", .path.display())]
    ArchivePack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The engine rejected or failed the build
    #[error("image build failed: {0}")]
    BuildEngine(#[source] EngineError),
    #[error("invalid task configuration: {0}")]
    InvalidConfig(String),
    #[error("operation cancelled")]
    Cancelled,
    /// A fork-join producer panicked or was aborted
    #[error("context producer failed to complete: {0}")]
    TaskJoin(String),
}

impl BuildError {
    /// Record failures only remove the fast freshness path; they never block a build.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RecordRead(_) | Self::RecordWrite(_))
    }

    /// Log a non-fatal failure as a warning and carry on; fatal ones propagate.
    pub fn downgrade(self, message: &str) -> Result<()> {
        if self.is_fatal() {
            return Err(self);
        }
        tracing::warn!(error = %self, "{}", message);
        Ok(())
    }
}

/// Failures of the per-image build record store
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no build record at {}", .path.display())]
    NotFound { path: PathBuf },
    #[error("corrupt build record at {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on build record {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecordError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failures reported by a build engine implementation
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no such image: {0}")]
    NoSuchImage(String),
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("unexpected engine response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
