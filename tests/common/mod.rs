#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use rebuildr::engine::{BuildEngine, BuildOptions, ImageMetadata};
use rebuildr::EngineError;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use walkdir::WalkDir;

/// In-memory engine: builds register a new image id, lookups read the registry.
#[derive(Default)]
pub struct FakeEngine {
    images: Mutex<HashMap<String, ImageMetadata>>,
    builds: Mutex<Vec<BuildOptions>>,
    lookup_failure: Mutex<Option<String>>,
    build_failure: Mutex<Option<String>>,
    counter: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_image(&self, name: &str, id: &str, created: DateTime<Utc>) {
        self.images.lock().unwrap().insert(
            name.to_string(),
            ImageMetadata {
                id: id.to_string(),
                created,
            },
        );
    }

    pub fn fail_lookups(&self, message: &str) {
        *self.lookup_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_builds(&self, message: &str) {
        *self.build_failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn builds(&self) -> Vec<BuildOptions> {
        self.builds.lock().unwrap().clone()
    }

    pub fn image(&self, name: &str) -> Option<ImageMetadata> {
        self.images.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl BuildEngine for FakeEngine {
    async fn lookup_image(&self, name: &str) -> Result<ImageMetadata, EngineError> {
        if let Some(message) = self.lookup_failure.lock().unwrap().clone() {
            return Err(EngineError::CommandFailed {
                command: "fake image inspect".to_string(),
                status: 1,
                stderr: message,
            });
        }
        self.image(name)
            .ok_or_else(|| EngineError::NoSuchImage(name.to_string()))
    }

    async fn build_image(
        &self,
        options: BuildOptions,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), EngineError> {
        if let Some(message) = self.build_failure.lock().unwrap().clone() {
            return Err(EngineError::CommandFailed {
                command: "fake build".to_string(),
                status: 1,
                stderr: message,
            });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("sha256:fake{n}");
        writeln!(sink, "Successfully built {id}")?;
        self.insert_image(&options.name, &id, Utc::now());
        self.builds.lock().unwrap().push(options);
        Ok(())
    }
}

/// Set the mtime of `root` and everything below it.
pub fn set_tree_mtime(root: &Path, mtime: FileTime) {
    for entry in WalkDir::new(root) {
        filetime::set_file_mtime(entry.unwrap().path(), mtime).unwrap();
    }
}

/// Push every mtime under `root` `secs` seconds into the past.
pub fn age_tree(root: &Path, secs: i64) {
    let then = Utc::now().timestamp() - secs;
    set_tree_mtime(root, FileTime::from_unix_time(then, 0));
}
