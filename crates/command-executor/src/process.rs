//! Process management traits and types

use crate::error::{Error, Result};
use async_trait::async_trait;

/// A handle to control a running process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID
    fn pid(&self) -> Option<u32>;

    /// Wait for the process to complete and return its exit status
    async fn wait(&mut self) -> Result<ExitStatus>;
}

/// Process exit status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
        }
    }
}

/// Collected result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// How the process exited
    pub status: ExitStatus,
    /// Stdout lines joined with `\n`
    pub stdout: String,
    /// Stderr lines joined with `\n`
    pub stderr: String,
}

impl CommandOutput {
    /// Turn a non-zero exit into [`Error::CommandFailed`]
    pub fn ensure_success(self, command: impl Into<String>) -> Result<Self> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(Error::CommandFailed {
                command: command.into(),
                code: self.status.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32) -> CommandOutput {
        CommandOutput {
            status: ExitStatus {
                code: Some(code),
                #[cfg(unix)]
                signal: None,
            },
            stdout: "out".into(),
            stderr: "  bad things\n".into(),
        }
    }

    #[test]
    fn test_ensure_success() {
        assert!(output(0).ensure_success("true").is_ok());

        match output(3).ensure_success("false") {
            Err(Error::CommandFailed {
                command,
                code,
                stderr,
            }) => {
                assert_eq!(command, "false");
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad things");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
