//! Core model for deploying loko projects
//!
//! A [`Project`] is read from disk, combined with the global
//! [`ExtensionRegistry`] by a [`PlanBuilder`] into a [`Plan`], and the plan is
//! emitted as a compose manifest with [`compose::emit`]. Cross-invocation
//! state lives in `plan.json` behind [`StateStore`].

#![warn(missing_docs)]

pub mod compose;
pub mod config;
pub mod error;
pub mod extension;
pub mod plan;
pub mod planner;
pub mod project;
pub mod proxy;
pub mod sink;
pub mod state;

pub use compose::{ComposeFile, ComposeService};
pub use config::{DeployConfig, RegistryAuth};
pub use error::{Error, Result};
pub use extension::{Extension, ExtensionConfig, ExtensionRegistry, Include};
pub use plan::{Plan, RoutingRule, RuleType, ServiceDefinition};
pub use planner::PlanBuilder;
pub use project::{Node, NodeKind, Project};
pub use sink::{LogEvent, LogLevel, LogSink, MemorySink, NullSink, TracingSink};
pub use state::{CloudState, PersistedState, ProviderKind, StateStore};
