//! Error types for image builds

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while building or pushing images
#[derive(Debug, Error)]
pub enum Error {
    /// The build log did not end with the success marker
    #[error("build of {image} failed")]
    BuildFailure {
        /// Image tag being built
        image: String,
    },

    /// The registry reported an error while pushing
    #[error("push of {image} failed: {message}")]
    PushFailure {
        /// Image being pushed
        image: String,
        /// Error reported by the engine
        message: String,
    },

    /// Talking to the Docker engine failed
    #[error("docker engine error: {0}")]
    Engine(#[from] bollard::errors::Error),

    /// A build context has no Dockerfile
    #[error("no Dockerfile found in {0}")]
    MissingDockerfile(PathBuf),

    /// A resource or include source does not exist
    #[error("resource not found: {0}")]
    MissingResource(PathBuf),

    /// A `.dockerignore` line could not be parsed
    #[error("invalid ignore pattern in {path}: {message}")]
    InvalidIgnorePattern {
        /// The ignore file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Malformed engine output
    #[error("invalid log entry: {0}")]
    Json(#[from] serde_json::Error),

    /// Plan or project error
    #[error(transparent)]
    Core(#[from] loko_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for image builds
pub type Result<T> = std::result::Result<T, Error>;
