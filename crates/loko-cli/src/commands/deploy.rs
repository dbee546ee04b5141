use crate::context::{Context, DEFAULT_KEY_PATH};
use anyhow::{Result, bail};
use clap::Args;
use cloud_deploy::{RemoteDeployer, RemoteSettings};
use command_executor::LocalLauncher;
use loko_core::{TracingSink, proxy};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Private key used for ssh and scp
    #[arg(long, default_value = DEFAULT_KEY_PATH)]
    pub key_path: PathBuf,
}

pub async fn run(ctx: &Context, args: DeployArgs) -> Result<()> {
    let manifest = ctx.manifest_path();
    if !manifest.is_file() {
        bail!("{} not found, run `loko plan` first", manifest.display());
    }

    let state = ctx.store.load()?;
    let cloud = state.cloud.as_ref().ok_or(cloud_deploy::Error::MissingInstance)?;
    let instance = ctx
        .provisioner(ctx.recorded_provider(cloud))
        .current()
        .await?;

    let mut files = vec![manifest];
    if state.https {
        files.extend(proxy::existing_files(&ctx.project_dir));
    }

    let settings = RemoteSettings::from_config(&ctx.config.remote, args.key_path);
    RemoteDeployer::new(LocalLauncher, settings, TracingSink)
        .deploy(&instance, &files)
        .await?;

    println!("Deployed {} to {}", ctx.slug(), instance.id);
    Ok(())
}
