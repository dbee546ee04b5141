//! Cloud instances and remote deployment
//!
//! A [`Provisioner`] creates or reuses the single instance hosting a project
//! and records it in the project's `plan.json`. Instances are managed through
//! the provider command line tools behind the [`CloudCli`] seam, with
//! [`AwsProvider`] and [`AzureProvider`] as the two backends. The
//! [`RemoteDeployer`] copies the compose manifest to a running instance and
//! restarts the stack over SSH.

#![warn(missing_docs)]

pub mod aws;
pub mod azure;
pub mod cli;
pub mod error;
pub mod instance;
pub mod provider;
pub mod provisioner;
pub mod remote;
pub mod retry;

pub use aws::AwsProvider;
pub use azure::{AzureProvider, AzureResourceId};
pub use cli::{CloudCli, SystemCli};
pub use error::{Error, Result};
pub use instance::{Instance, InstanceState};
pub use provider::{CloudProvider, CreateRequest};
pub use provisioner::{Provisioner, WaitPolicy};
pub use remote::{RemoteDeployer, RemoteSettings};
pub use retry::RetryPolicy;
