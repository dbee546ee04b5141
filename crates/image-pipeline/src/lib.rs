//! Image builds for loko deployments
//!
//! The [`ImagePipeline`] turns the build steps of a [`loko_core::Plan`] into
//! image builds and pushes against an [`ImageEngine`]. Build contexts are
//! packed as gzip tarballs by [`BuildContext`], with generated Dockerfiles
//! and staged files where a step needs them.

#![warn(missing_docs)]

pub mod context;
pub mod dockerfile;
pub mod engine;
pub mod error;
pub mod logs;
pub mod pipeline;
pub mod staging;

pub use context::{BuildContext, DockerfileSource};
pub use dockerfile::Dockerfile;
pub use engine::{BuildRequest, DockerEngine, ImageEngine, LogStream};
pub use error::{Error, Result};
pub use logs::{BuildTranscript, LogEntry};
pub use pipeline::{ImagePipeline, PipelineReport};
pub use staging::StagingDir;
