pub mod config;
pub mod constants;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod record;
pub mod staleness;
pub mod task;

pub use config::{BuildTaskConfig, ExecutionContext};
pub use error::{BuildError, EngineError, RecordError, Result};
pub use staleness::{StaleReason, Verdict};
pub use task::ImageTask;
