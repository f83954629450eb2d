// Centralized constants for rebuildr

/// Name of the synthetic Dockerfile entry in a context archive
pub const DOCKERFILE_ENTRY_NAME: &str = "Dockerfile";

/// Mode of the synthetic Dockerfile entry
pub const DOCKERFILE_ENTRY_MODE: u32 = 0o644;

/// Ignore-pattern file looked up in the context root when none are configured
pub const DEFAULT_IGNORE_FILE: &str = ".dockerignore";

/// Directory (under the working directory) holding persisted state
pub const DEFAULT_STATE_DIR: &str = ".rebuildr";

/// Subdirectory of the state directory holding one build record per image
pub const IMAGE_RECORDS_DIR: &str = "images";

/// Overrides the state directory location
pub const STATE_DIR_ENV: &str = "REBUILDR_STATE_DIR";

/// Tag used when a task does not name one
pub const DEFAULT_TAG: &str = "latest";

/// Engine binary used by the CLI engine
pub const DEFAULT_DOCKER_BINARY: &str = "docker";
