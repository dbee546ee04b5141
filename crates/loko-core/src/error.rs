//! Error types for project loading and planning

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading projects, planning or persisting state
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No `loko.project` file in the given directory
    #[error("no loko.project found in {}", .0.display())]
    ProjectNotFound(PathBuf),

    /// The project file decoded but its content is not a project
    #[error("invalid project: {0}")]
    InvalidProject(String),

    /// Two services in one plan share a name
    #[error("duplicate service name in plan: {0}")]
    DuplicateService(String),

    /// Configuration is malformed
    #[error("configuration error: {0}")]
    Config(String),

    /// Referenced environment variables are not set and have no default
    #[error("environment variable(s) not found: {0}")]
    EnvVarNotFound(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
