use crate::constants::{DEFAULT_IGNORE_FILE, DEFAULT_TAG};
use crate::engine::{AuthConfigs, BuildEngine};
use crate::error::{BuildError, Result};
use crate::record::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Configuration of one image build task, as written in a task file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildTaskConfig {
    /// Image repository, e.g. `registry.local/team/app`
    pub image: String,
    pub tag: Option<String>,
    /// Build context directory, relative to the working directory
    pub context: PathBuf,
    /// Dockerfile, relative to the context directory
    pub dockerfile: Option<PathBuf>,
    /// Inline Dockerfile text, packed with the context
    pub steps: Option<String>,
    pub args: BTreeMap<String, String>,
    pub pull_base_image_on_build: bool,
    /// Ignore-pattern sources; `<context>/.dockerignore` when empty
    pub ignore_files: Vec<PathBuf>,
}

impl BuildTaskConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            BuildError::InvalidConfig(format!("cannot read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&content).map_err(|err| {
            BuildError::InvalidConfig(format!("cannot parse {}: {err}", path.display()))
        })
    }

    /// Exactly one of `dockerfile` and `steps` must be set.
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(BuildError::InvalidConfig("image name is empty".to_string()));
        }
        match (&self.dockerfile, &self.steps) {
            (Some(_), Some(_)) => Err(BuildError::InvalidConfig(
                "dockerfile and steps are mutually exclusive".to_string(),
            )),
            (None, None) => Err(BuildError::InvalidConfig(
                "one of dockerfile or steps is required".to_string(),
            )),
            (None, Some(steps)) if steps.trim().is_empty() => {
                Err(BuildError::InvalidConfig("steps are empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn steps(&self) -> Option<&str> {
        self.steps.as_deref()
    }
}

/// Everything a task borrows from its surroundings: where it runs, which
/// engine it talks to, and whether its output is shown.
#[derive(Clone)]
pub struct ExecutionContext {
    pub working_dir: PathBuf,
    pub engine: Arc<dyn BuildEngine>,
    pub quiet: bool,
    pub auth_configs: AuthConfigs,
    pub records: RecordStore,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(working_dir: impl Into<PathBuf>, engine: Arc<dyn BuildEngine>) -> Self {
        let working_dir = working_dir.into();
        let records = RecordStore::new(RecordStore::state_dir(&working_dir));
        Self {
            working_dir,
            engine,
            quiet: false,
            auth_configs: AuthConfigs::new(),
            records,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn with_auth_configs(mut self, auth_configs: AuthConfigs) -> Self {
        self.auth_configs = auth_configs;
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.records = RecordStore::new(state_dir);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `repo:tag`, with the tag defaulting to `latest`.
    pub fn image_name(&self, config: &BuildTaskConfig) -> String {
        let tag = config.tag.as_deref().unwrap_or(DEFAULT_TAG);
        format!("{}:{}", config.image, tag)
    }

    pub fn record_path(&self, config: &BuildTaskConfig) -> PathBuf {
        self.records.path_for(&self.image_name(config))
    }

    pub fn context_dir(&self, config: &BuildTaskConfig) -> PathBuf {
        self.resolve(&config.context)
    }

    /// Configured ignore sources, or the context's `.dockerignore` if present.
    pub fn ignore_sources(&self, config: &BuildTaskConfig) -> Vec<PathBuf> {
        if !config.ignore_files.is_empty() {
            return config.ignore_files.iter().map(|p| self.resolve(p)).collect();
        }
        let default = self.context_dir(config).join(DEFAULT_IGNORE_FILE);
        if default.is_file() {
            vec![default]
        } else {
            Vec::new()
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}
