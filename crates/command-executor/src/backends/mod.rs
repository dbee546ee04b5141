//! Backend implementations for different execution contexts
//!
//! [`local::LocalLauncher`] spawns processes on this machine. [`ssh::SshLauncher`]
//! wraps another launcher and rewrites each command into an `ssh` invocation.

pub mod local;
pub mod ssh;
