//! Ordered image builds for a plan
//!
//! Extension images are built (and pushed) before the orchestrator image
//! because the orchestrator image embeds the extensions' shared descriptors.
//! The first failed build or push stops the pipeline.

use crate::context::{BuildContext, DockerfileSource, dockerfile_path};
use crate::dockerfile::Dockerfile;
use crate::engine::{BuildRequest, ImageEngine};
use crate::logs::BuildTranscript;
use crate::staging::StagingDir;
use crate::{Error, Result};
use futures::StreamExt;
use loko_core::plan::{GlobalExtension, Plan};
use loko_core::{LogEvent, LogSink};
use std::path::{Path, PathBuf};

/// Where projects live inside the orchestrator image
const PROJECTS_DIR: &str = "/root/loko/projects";
const IMAGE_DATA_DIR: &str = "/root/loko/data";
const IMAGE_SHARED_DIR: &str = "/root/loko/shared/";
const ORCHESTRATOR_CMD: &str = "python services.py";
/// Context directory holding the project's own files in the orchestrator build
const PROJECT_PREFIX: &str = "project";

/// What a pipeline run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Images built, in order
    pub built: Vec<String>,
    /// Images pushed, in order
    pub pushed: Vec<String>,
}

/// Builds and pushes the images of a plan
pub struct ImagePipeline<E, S> {
    engine: E,
    sink: S,
    loko_home: PathBuf,
    push: bool,
    no_cache: bool,
    build_args: Vec<(String, String)>,
}

impl<E: ImageEngine, S: LogSink> ImagePipeline<E, S> {
    /// A pipeline that builds without pushing
    pub fn new(engine: E, sink: S, loko_home: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            sink,
            loko_home: loko_home.into(),
            push: false,
            no_cache: false,
            build_args: Vec::new(),
        }
    }

    /// Push every image right after it is built
    pub fn push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Ignore the layer cache
    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    /// Pass `ARG key` to every build
    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.push((key.into(), value.into()));
        self
    }

    /// Build every image of `plan`
    pub async fn run(&self, plan: &Plan) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        for local in &plan.local_extensions {
            let context = BuildContext::pack(&local.root, DockerfileSource::OnDisk)?;
            self.step(&local.service.image, context, &mut report).await?;
        }

        for global in &plan.global_extensions {
            self.global_step(global, &mut report).await?;
        }

        self.orchestrator_step(plan, &mut report).await?;

        tracing::info!(
            built = report.built.len(),
            pushed = report.pushed.len(),
            "image pipeline finished"
        );
        Ok(report)
    }

    async fn step(
        &self,
        image: &str,
        context: BuildContext,
        report: &mut PipelineReport,
    ) -> Result<()> {
        if !self.build(context, image).await? {
            return Err(Error::BuildFailure {
                image: image.to_string(),
            });
        }
        report.built.push(image.to_string());
        if self.push {
            self.push_image(image).await?;
            report.pushed.push(image.to_string());
        }
        Ok(())
    }

    async fn global_step(&self, global: &GlobalExtension, report: &mut PipelineReport) -> Result<()> {
        let image = &global.service.image;
        if global.includes.is_empty() {
            let context = BuildContext::pack(&global.root, DockerfileSource::OnDisk)?;
            return self.step(image, context, report).await;
        }

        let staging = StagingDir::new_in(&global.root)?;
        let mut dockerfile = Dockerfile::from_file(&dockerfile_path(&global.root))?;
        for include in &global.includes {
            let source = self.loko_home.join(&include.source);
            let staged = staging.stage(&source, Path::new(&include.source))?;
            dockerfile = dockerfile.copy(&staged, &include.target);
        }
        let result = match BuildContext::pack(
            &global.root,
            DockerfileSource::Inline(dockerfile.render()),
        ) {
            Ok(context) => self.step(image, context, report).await,
            Err(e) => Err(e),
        };
        let closed = staging.close();
        result?;
        closed
    }

    async fn orchestrator_step(&self, plan: &Plan, report: &mut PipelineReport) -> Result<()> {
        let project = project_dir_name(&plan.project_dir);
        let staging = StagingDir::new_in(&plan.project_dir)?;
        let target = format!("{PROJECTS_DIR}/{project}");

        let mut dockerfile = Dockerfile::from_image(&plan.orchestrator_base)
            .run(&format!("mkdir -p {target}"))
            .copy(&format!("{PROJECT_PREFIX}/"), &format!("{target}/"));

        if !plan.resources.is_empty() {
            for resource in &plan.resources {
                let source = self.loko_home.join(resource);
                let rel = Path::new(resource);
                let rel = rel.strip_prefix("data").unwrap_or(rel);
                staging.stage(&source, &Path::new("data").join(rel))?;
            }
            dockerfile = dockerfile.copy(&staging.context_path(Path::new("data")), IMAGE_DATA_DIR);
        }

        if !plan.global_extensions.is_empty() {
            for global in &plan.global_extensions {
                let rel = self.shared_path(global);
                staging.stage(&global.descriptor, &rel)?;
            }
            let shared = format!("{}/", staging.context_path(Path::new("shared")));
            dockerfile = dockerfile.copy(&shared, IMAGE_SHARED_DIR);
        }

        let dockerfile = dockerfile.cmd(ORCHESTRATOR_CMD);
        let result = match BuildContext::pack_nested(
            &plan.project_dir,
            dockerfile.render(),
            PROJECT_PREFIX,
        ) {
            Ok(context) => self.step(&plan.orchestrator.image, context, report).await,
            Err(e) => Err(e),
        };
        let closed = staging.close();
        result?;
        closed
    }

    // Descriptor location under the loko home, e.g.
    // `shared/extensions/ocr/extensions/components.json`.
    fn shared_path(&self, global: &GlobalExtension) -> PathBuf {
        match global.descriptor.strip_prefix(&self.loko_home) {
            Ok(rel) if rel.starts_with("shared") => rel.to_path_buf(),
            _ => PathBuf::from("shared/extensions")
                .join(&global.service.name)
                .join("extensions")
                .join(loko_core::extension::COMPONENTS_FILE),
        }
    }

    /// Build one image; `Ok(false)` when the log did not end in success
    pub async fn build(&self, context: BuildContext, image: &str) -> Result<bool> {
        let source = format!("{image}:builder");
        self.sink
            .emit(LogEvent::info(&source, format!("building {image}")));

        let request = BuildRequest {
            image: image.to_string(),
            context: context.into_bytes(),
            no_cache: self.no_cache,
            build_args: self.build_args.clone(),
        };

        let mut transcript = BuildTranscript::default();
        let mut stream = self.engine.build(request);
        while let Some(entry) = stream.next().await {
            let entry = entry?;
            transcript.observe(&entry);
            if let Some(error) = &entry.error {
                self.sink.emit(LogEvent::error(&source, error.clone()));
            } else if let Some(text) = entry.text() {
                self.sink.emit(LogEvent::debug(&source, text));
            }
        }

        let ok = transcript.succeeded();
        if ok {
            self.sink.emit(LogEvent::info(&source, format!("built {image}")));
        } else {
            tracing::error!(image = %image, last_line = ?transcript.last_line(), "build failed");
            self.sink
                .emit(LogEvent::error(&source, format!("build of {image} failed")));
        }
        Ok(ok)
    }

    /// Push one image, failing on the first error entry
    pub async fn push_image(&self, image: &str) -> Result<()> {
        let source = format!("{image}:pusher");
        self.sink.emit(LogEvent::info(&source, format!("pushing {image}")));

        let mut stream = self.engine.push(image);
        while let Some(entry) = stream.next().await {
            let entry = entry?;
            if let Some(message) = entry.error {
                self.sink.emit(LogEvent::error(&source, message.clone()));
                tracing::error!(image = %image, error = %message, "push failed");
                return Err(Error::PushFailure {
                    image: image.to_string(),
                    message,
                });
            }
            if let Some(text) = entry.text() {
                self.sink.emit(LogEvent::debug(&source, text));
            }
        }

        self.sink.emit(LogEvent::info(&source, format!("pushed {image}")));
        Ok(())
    }
}

fn project_dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_dir_name() {
        assert_eq!(project_dir_name(Path::new("/home/me/loko/projects/shop")), "shop");
        assert_eq!(project_dir_name(Path::new("/")), "project");
    }
}
