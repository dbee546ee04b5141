//! Runtime-agnostic command execution library
//!
//! This crate runs external programs either on the local machine or on a
//! remote host reached through the system `ssh` client. Output is exposed as a
//! stream of [`ProcessEvent`]s so callers can forward lines as they arrive, or
//! collected into a [`CommandOutput`] when only the final result matters.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod event;
pub mod launcher;
pub mod process;

pub use backends::local::LocalLauncher;
pub use backends::ssh::{SshConfig, SshLauncher};
pub use command::Command;
pub use error::{Error, Result};
pub use event::{ProcessEvent, ProcessEventType};
pub use launcher::Launcher;
pub use process::{CommandOutput, ExitStatus, ProcessHandle};
