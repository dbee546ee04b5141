//! `loko ec2` and `loko azure`

use crate::context::{Context, DEFAULT_KEY_PATH, key_name};
use anyhow::Result;
use clap::Args;
use cloud_deploy::{AwsProvider, AzureProvider, CloudProvider, CreateRequest, Instance, SystemCli, aws, azure};
use std::path::PathBuf;

/// AMI used when `--ami` is not given
pub const DEFAULT_AMI: &str = "ami-0a691527202ea8b3d";
/// Azure image alias used when `--image` is not given
pub const DEFAULT_AZURE_IMAGE: &str = "Ubuntu2204";

#[derive(Args, Debug)]
pub struct Ec2Args {
    /// Instance name tag (defaults to the project directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// AWS region
    #[arg(long, default_value = aws::DEFAULT_REGION)]
    pub region: String,

    /// Security group name
    #[arg(long, default_value = "default")]
    pub security_group: String,

    /// Instance type
    #[arg(long, default_value = "t2.micro")]
    pub instance_type: String,

    /// Machine image
    #[arg(long, default_value = DEFAULT_AMI)]
    pub ami: String,

    /// Root volume size in GB
    #[arg(long, default_value_t = 30)]
    pub volume_size: u32,

    /// Private key; its file stem names the registered key pair
    #[arg(long, default_value = DEFAULT_KEY_PATH)]
    pub key_path: PathBuf,
}

#[derive(Args, Debug)]
pub struct AzureArgs {
    /// VM name (defaults to the project directory name)
    #[arg(long)]
    pub name: Option<String>,

    /// Azure location
    #[arg(long, default_value = azure::DEFAULT_LOCATION)]
    pub region: String,

    /// Resource group
    #[arg(long, default_value = azure::DEFAULT_GROUP)]
    pub resource_group: String,

    /// Network security group
    #[arg(long, default_value = azure::DEFAULT_GROUP)]
    pub security_group: String,

    /// Virtual network
    #[arg(long, default_value = azure::DEFAULT_GROUP)]
    pub virtual_network: String,

    /// VM size
    #[arg(long, default_value = "Standard_B1s")]
    pub instance_type: String,

    /// Machine image
    #[arg(long, default_value = DEFAULT_AZURE_IMAGE)]
    pub image: String,

    /// OS disk size in GB
    #[arg(long, default_value_t = 30)]
    pub volume_size: u32,

    /// Private key; its file stem names the registered SSH public key
    #[arg(long, default_value = DEFAULT_KEY_PATH)]
    pub key_path: PathBuf,
}

pub async fn run_ec2(ctx: &Context, args: Ec2Args) -> Result<()> {
    let request = CreateRequest {
        name: args.name.unwrap_or_else(|| ctx.slug()),
        image: args.ami,
        instance_type: args.instance_type,
        volume_size_gb: args.volume_size,
        security_group: args.security_group,
        key_name: key_name(&args.key_path)?,
    };
    provision(ctx, AwsProvider::new(SystemCli::new(), args.region), &request).await
}

pub async fn run_azure(ctx: &Context, args: AzureArgs) -> Result<()> {
    let request = CreateRequest {
        name: args.name.unwrap_or_else(|| ctx.slug()),
        image: args.image,
        instance_type: args.instance_type,
        volume_size_gb: args.volume_size,
        security_group: args.security_group,
        key_name: key_name(&args.key_path)?,
    };
    let provider = AzureProvider::new(SystemCli::new(), args.region)
        .resource_group(args.resource_group)
        .virtual_network(args.virtual_network)
        .admin_user(&ctx.config.remote.user);
    provision(ctx, provider, &request).await
}

async fn provision<P: CloudProvider>(ctx: &Context, provider: P, request: &CreateRequest) -> Result<()> {
    let instance = ctx.provisioner(provider).init(request).await?;
    print_instance(&instance);
    Ok(())
}

pub fn print_instance(instance: &Instance) {
    println!("Instance {} is {}", instance.id, instance.state);
    if let Some(dns) = &instance.public_dns {
        println!("Public DNS name: {dns}");
    }
    if let Some(ip) = &instance.public_ip {
        println!("Public IP address: {ip}");
    }
}
