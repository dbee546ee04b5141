//! Error types for provisioning and deployment

use loko_core::ProviderKind;
use thiserror::Error;

/// Errors produced while managing instances or deploying to them
#[derive(Debug, Error)]
pub enum Error {
    /// A provider call failed or answered something unexpected
    #[error("provisioning failed: {0}")]
    ProvisionFailure(String),

    /// An existing instance is in a state that cannot be used
    #[error("instance {id} is in state {state}")]
    InstanceNotRunning {
        /// Instance id
        id: String,
        /// Reported state
        state: String,
    },

    /// Deployment attempted on an instance that is not running
    #[error("can't deploy: instance {id} is in state {state}")]
    DeployPrecondition {
        /// Instance id
        id: String,
        /// Reported state
        state: String,
    },

    /// No instance is recorded for the project
    #[error("there is no instance for this project")]
    MissingInstance,

    /// The recorded instance belongs to another provider
    #[error("project instance is managed by {found}, not {expected}")]
    ProviderMismatch {
        /// Provider of the current command
        expected: ProviderKind,
        /// Provider recorded in the state file
        found: ProviderKind,
    },

    /// The instance did not reach the running state in time
    #[error("instance {id} not running after {secs}s")]
    Timeout {
        /// Instance id
        id: String,
        /// Seconds waited
        secs: u64,
    },

    /// A remote command exited with a failure
    #[error("remote command `{command}` failed with exit code {code:?}")]
    RemoteCommand {
        /// The command line
        command: String,
        /// Exit code, if any
        code: Option<i32>,
    },

    /// The instance has no public address to connect to
    #[error("instance {0} has no public address")]
    NoAddress(String),

    /// Running a local program failed
    #[error(transparent)]
    CommandExecutor(#[from] command_executor::Error),

    /// Unreadable provider output
    #[error("invalid provider response: {0}")]
    Json(#[from] serde_json::Error),

    /// State file or project error
    #[error(transparent)]
    Core(#[from] loko_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for provisioning and deployment
pub type Result<T> = std::result::Result<T, Error>;
