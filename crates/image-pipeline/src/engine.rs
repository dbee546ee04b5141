//! Image engine abstraction and its Docker implementation

use crate::logs::LogEntry;
use crate::{Error, Result};
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::image::{BuildImageOptions, PushImageOptions};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use loko_core::RegistryAuth;

/// Stream of log entries from a build or push
pub type LogStream<'a> = BoxStream<'a, Result<LogEntry>>;

/// One image build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Tag to apply to the result
    pub image: String,
    /// Gzip tarball of the build context
    pub context: Vec<u8>,
    /// Build without the layer cache
    pub no_cache: bool,
    /// `ARG` values, in order
    pub build_args: Vec<(String, String)>,
}

/// Something that can build and push images
///
/// Errors reported inside the log (an `error` entry) are yielded as entries;
/// `Err` items mean the engine itself could not be reached or answered
/// something unreadable.
pub trait ImageEngine: Send + Sync {
    /// Build an image, streaming its log
    fn build(&self, request: BuildRequest) -> LogStream<'_>;

    /// Push an image, streaming its log
    fn push(&self, image: &str) -> LogStream<'_>;
}

impl<T: ImageEngine + ?Sized> ImageEngine for &T {
    fn build(&self, request: BuildRequest) -> LogStream<'_> {
        (**self).build(request)
    }

    fn push(&self, image: &str) -> LogStream<'_> {
        (**self).push(image)
    }
}

impl<T: ImageEngine + ?Sized> ImageEngine for std::sync::Arc<T> {
    fn build(&self, request: BuildRequest) -> LogStream<'_> {
        (**self).build(request)
    }

    fn push(&self, image: &str) -> LogStream<'_> {
        (**self).push(image)
    }
}

/// [`ImageEngine`] backed by the local Docker daemon
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
    credentials: Option<DockerCredentials>,
}

impl DockerEngine {
    /// Connect using the standard socket / environment settings
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::with_client(docker))
    }

    /// Use an existing client
    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            credentials: None,
        }
    }

    /// Authenticate pushes with `auth`
    pub fn with_registry_auth(mut self, auth: &RegistryAuth) -> Self {
        self.credentials = Some(DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.password.clone()),
            serveraddress: auth.server.clone(),
            ..Default::default()
        });
        self
    }
}

impl ImageEngine for DockerEngine {
    fn build(&self, request: BuildRequest) -> LogStream<'_> {
        tracing::debug!(image = %request.image, no_cache = request.no_cache, "starting build");
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: request.image,
            nocache: request.no_cache,
            buildargs: request.build_args.into_iter().collect(),
            rm: true,
            ..Default::default()
        };
        self.docker
            .build_image(options, None, Some(Bytes::from(request.context)))
            .map(|item| match item {
                Ok(info) => Ok(LogEntry {
                    stream: info.stream,
                    status: info.status,
                    error: info.error,
                    progress: info.progress,
                    id: info.id,
                }),
                Err(e) => stream_error(e),
            })
            .boxed()
    }

    fn push(&self, image: &str) -> LogStream<'_> {
        let (name, tag) = split_tag(image);
        tracing::debug!(name = %name, tag = %tag, "starting push");
        let options = PushImageOptions { tag };
        self.docker
            .push_image(&name, Some(options), self.credentials.clone())
            .map(|item| match item {
                Ok(info) => Ok(LogEntry {
                    status: info.status,
                    error: info.error,
                    progress: info.progress,
                    ..Default::default()
                }),
                Err(e) => stream_error(e),
            })
            .boxed()
    }
}

// Errors the daemon reports inside the stream become error entries so the
// caller sees them the same way as log errors.
fn stream_error(err: bollard::errors::Error) -> Result<LogEntry> {
    match err {
        bollard::errors::Error::DockerStreamError { error } => Ok(LogEntry::error(error)),
        other => Err(Error::Engine(other)),
    }
}

/// Split `repo[:tag]` into name and tag, defaulting to `latest`
///
/// A `:` before the last `/` belongs to a registry port, not a tag.
pub fn split_tag(image: &str) -> (String, String) {
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(pos) => {
            let split = name_start + pos;
            (image[..split].to_string(), image[split + 1..].to_string())
        }
        None => (image.to_string(), "latest".to_string()),
    }
}
