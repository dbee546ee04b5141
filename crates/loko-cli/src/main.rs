//! `loko`: build, provision and deploy loko projects

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

mod commands;
mod context;

use commands::deploy::DeployArgs;
use commands::plan::PlanArgs;
use commands::provision::{AzureArgs, Ec2Args};
use context::Context;

#[derive(Parser, Debug)]
#[command(name = "loko")]
#[command(about = "Build, provision and deploy loko projects")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/loko/deploy.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the project images and write docker-compose.yml
    Plan(PlanArgs),

    /// Create or reuse an EC2 instance for the project
    Ec2(Ec2Args),

    /// Create or reuse an Azure VM for the project
    Azure(AzureArgs),

    /// Copy the manifest to the instance and restart the stack
    Deploy(DeployArgs),

    /// Show the project instance and its endpoints
    Info,

    /// Terminate the project instance
    Destroy,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::load(cli.config.as_deref(), &cli.project)?;

    match cli.command {
        Commands::Plan(args) => commands::plan::run(&ctx, args).await,
        Commands::Ec2(args) => commands::provision::run_ec2(&ctx, args).await,
        Commands::Azure(args) => commands::provision::run_azure(&ctx, args).await,
        Commands::Deploy(args) => commands::deploy::run(&ctx, args).await,
        Commands::Info => commands::info::run(&ctx).await,
        Commands::Destroy => commands::destroy::run(&ctx).await,
    }
}
