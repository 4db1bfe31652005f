use std::time::Duration;
use thiserror::Error;

/// Errors produced by the pipeline executor and its components.
///
/// The conversation engine never surfaces errors; everything here belongs to
/// step planning, graph validation, or execution.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// JSON (de)serialization failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization failed.
    #[cfg(feature = "yaml")]
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration detected before execution.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two step definitions share an id.
    #[error("Duplicate step id '{0}'")]
    DuplicateStep(String),

    /// A step names a dependency that is not part of the pipeline.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    DanglingDependency { step: String, dependency: String },

    /// The dependency graph contains a cycle. Holds the offending path.
    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    /// `execute()` was called before any steps were configured.
    #[error("Pipeline has not been configured")]
    NotConfigured,

    /// `execute()` was called while another run is still in flight.
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// A step body failed. The pipeline halts after this.
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// A step's dependencies did not complete within the configured wait.
    #[error("Step '{step}' gave up waiting for dependencies after {waited:?}")]
    DependencyTimeout { step: String, waited: Duration },

    /// The run was abandoned by `reset()`.
    #[error("Pipeline run was cancelled")]
    Cancelled,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
