use crate::constants::{DEFAULT_STATE_DIR, IMAGE_RECORDS_DIR, STATE_DIR_ENV};
use crate::error::RecordError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Last image successfully built for a task. The file's own mtime is the
/// "last known good" timestamp; it is not stored in the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub image_id: String,
}

impl BuildRecord {
    pub fn new(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
        }
    }
}

/// A record as read from disk, with the file's modification time.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub record: BuildRecord,
    pub modified: DateTime<Utc>,
}

/// Read the record at `path`.
pub fn read_record(path: &Path) -> Result<StoredRecord, RecordError> {
    let content = fs::read(path).map_err(|source| io_error(path, source))?;
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| io_error(path, source))?;
    let record = serde_json::from_slice(&content).map_err(|source| RecordError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(StoredRecord {
        record,
        modified: DateTime::<Utc>::from(modified),
    })
}

/// Replace whatever is stored at `path` with `record`.
pub fn write_record(path: &Path, record: &BuildRecord) -> Result<(), RecordError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    let content = serde_json::to_vec_pretty(record).map_err(|source| RecordError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> RecordError {
    if source.kind() == ErrorKind::NotFound {
        RecordError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        RecordError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Locates one record file per image under a state directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: state_dir.into().join(IMAGE_RECORDS_DIR),
        }
    }

    /// `$REBUILDR_STATE_DIR` if set, else `<working_dir>/.rebuildr`.
    pub fn state_dir(working_dir: &Path) -> PathBuf {
        if let Ok(dir) = std::env::var(STATE_DIR_ENV) {
            return PathBuf::from(dir);
        }
        working_dir.join(DEFAULT_STATE_DIR)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record location for an image name. Deterministic, so rerunning a task
    /// lands on the same file.
    pub fn path_for(&self, image_name: &str) -> PathBuf {
        self.dir.join(image_name.replace(['/', ':'], "-"))
    }

    pub fn read(&self, image_name: &str) -> Result<StoredRecord, RecordError> {
        read_record(&self.path_for(image_name))
    }

    pub fn write(&self, image_name: &str, record: &BuildRecord) -> Result<(), RecordError> {
        write_record(&self.path_for(image_name), record)
    }
}
