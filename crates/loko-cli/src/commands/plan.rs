use crate::context::Context;
use anyhow::{Context as _, Result, bail};
use clap::Args;
use image_pipeline::{DockerEngine, ImagePipeline};
use loko_core::{ExtensionRegistry, PlanBuilder, TracingSink, compose, planner, proxy};
use std::path::Path;
use tracing::info;

#[derive(Args, Debug, Default)]
pub struct PlanArgs {
    /// Push every image after it is built
    #[arg(long)]
    pub push: bool,

    /// Company name or private registry prefixing the built images
    #[arg(long)]
    pub company: Option<String>,

    /// Host port the gateway is published on
    #[arg(long)]
    pub gateway_port: Option<u16>,

    /// Terminate TLS in a reverse proxy in front of the gateway
    #[arg(long)]
    pub https: bool,

    /// Replace an existing docker-compose.yml
    #[arg(long)]
    pub overwrite: bool,

    /// Build without the layer cache
    #[arg(long)]
    pub no_cache: bool,
}

pub async fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let manifest = ctx.manifest_path();
    ensure_writable(&manifest, args.overwrite)?;

    let mut config = ctx.config.clone();
    if let Some(company) = args.company {
        config.company = Some(company);
    }
    if let Some(port) = args.gateway_port {
        config.gateway_port = port;
    }

    let project = ctx.project()?;
    let registry = ExtensionRegistry::discover(config.extensions_root())
        .context("failed to scan the extension registry")?;
    let plan = PlanBuilder::from_config(&config)
        .context("pass --company or set `company` in the config file")?
        .https(args.https)
        .build(&project, &registry)?;
    info!(
        project = %plan.namespace,
        services = plan.services().len(),
        images = plan.built_images().len(),
        "plan ready"
    );

    let mut engine = DockerEngine::connect().context("failed to connect to the Docker daemon")?;
    if let Some(auth) = &config.registry {
        engine = engine.with_registry_auth(auth);
    }
    let report = ImagePipeline::new(engine, TracingSink, &config.loko_home)
        .push(args.push)
        .no_cache(args.no_cache)
        .build_arg("GATEWAY", planner::internal_gateway())
        .run(&plan)
        .await?;
    info!(built = report.built.len(), pushed = report.pushed.len(), "images ready");

    compose::emit(&plan).write(&manifest)?;
    if args.https {
        proxy::write_config(&ctx.project_dir, &config.public_host)?;
    }
    ctx.store.update(|state| {
        state.https = args.https;
        state.gateway_port = Some(config.gateway_port);
    })?;

    println!("Wrote {}", manifest.display());
    Ok(())
}

/// Refuse to clobber a manifest unless asked to
fn ensure_writable(manifest: &Path, overwrite: bool) -> Result<()> {
    if manifest.exists() && !overwrite {
        bail!(
            "{} already exists, pass --overwrite to replace it",
            manifest.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_writable() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("docker-compose.yml");
        assert!(ensure_writable(&manifest, false).is_ok());

        std::fs::write(&manifest, "version: '3.3'\n").unwrap();
        let err = ensure_writable(&manifest, false).unwrap_err();
        assert!(err.to_string().contains("--overwrite"));
        assert!(ensure_writable(&manifest, true).is_ok());
    }
}
