use crate::error::EngineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

pub mod docker_cli;

pub use docker_cli::DockerCliEngine;

/// Engine-side view of a built image. Fetched per operation, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub id: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArg {
    pub name: String,
    pub value: String,
}

/// Credentials for one registry, keyed by server address in [`AuthConfigs`].
#[derive(Clone, Default)]
pub struct RegistryAuth {
    pub username: Option<String>,
    pub password: Option<String>,
    pub server_address: String,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("server_address", &self.server_address)
            .finish()
    }
}

pub type AuthConfigs = BTreeMap<String, RegistryAuth>;

/// What the engine builds from.
#[derive(Debug, Clone)]
pub enum BuildInput {
    /// A Dockerfile inside a context directory the engine reads itself
    Dockerfile {
        dockerfile: PathBuf,
        context_dir: PathBuf,
    },
    /// A packed tar stream holding the Dockerfile and the context
    Archive(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub name: String,
    pub build_args: Vec<BuildArg>,
    pub pull: bool,
    pub quiet: bool,
    pub auth_configs: AuthConfigs,
    pub input: BuildInput,
}

/// The image-building engine. Implementations must be safe to share across
/// tasks; a single task uses it sequentially.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Describe an image, or fail with [`EngineError::NoSuchImage`].
    async fn lookup_image(&self, name: &str) -> Result<ImageMetadata, EngineError>;

    /// Build an image, streaming the engine's output into `sink`.
    async fn build_image(
        &self,
        options: BuildOptions,
        sink: &mut (dyn Write + Send),
    ) -> Result<(), EngineError>;
}

/// Build arguments in name order.
pub fn build_args(args: &BTreeMap<String, String>) -> Vec<BuildArg> {
    args.iter()
        .map(|(name, value)| BuildArg {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_from_map() {
        let mut args = BTreeMap::new();
        args.insert("VERSION".to_string(), "1.2".to_string());
        args.insert("BASE".to_string(), "alpine".to_string());

        let args = build_args(&args);
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "BASE");
        assert_eq!(args[1].value, "1.2");
    }

    #[test]
    fn test_auth_debug_redacts_password() {
        let auth = RegistryAuth {
            username: Some("ci".to_string()),
            password: Some("hunter2".to_string()),
            server_address: "registry.local".to_string(),
        };
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("registry.local"));
    }
}
