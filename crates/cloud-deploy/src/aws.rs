//! EC2 instances through the `aws` CLI

use crate::cli::{CloudCli, args, failed_with};
use crate::instance::{Instance, InstanceState};
use crate::provider::{CloudProvider, CreateRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use loko_core::ProviderKind;
use serde_json::{Value, json};

/// Default region
pub const DEFAULT_REGION: &str = "eu-central-1";

const NOT_FOUND: &[&str] = &["InvalidInstanceID.NotFound", "InvalidInstanceID.Malformed"];

/// EC2 backend
#[derive(Debug, Clone)]
pub struct AwsProvider<C> {
    cli: C,
    region: String,
}

impl<C: CloudCli> AwsProvider<C> {
    /// Manage instances in `region`
    pub fn new(cli: C, region: impl Into<String>) -> Self {
        Self {
            cli,
            region: region.into(),
        }
    }

    async fn ec2(&self, parts: &[&str]) -> Result<Value> {
        let mut argv = args(&["ec2"]);
        argv.extend(args(parts));
        argv.extend(args(&["--region", &self.region, "--output", "json"]));
        self.cli.run_json("aws", &argv).await
    }
}

#[async_trait]
impl<C: CloudCli> CloudProvider for AwsProvider<C> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aws
    }

    fn region(&self) -> Option<&str> {
        Some(&self.region)
    }

    async fn create(&self, request: &CreateRequest) -> Result<String> {
        let devices = json!([{
            "DeviceName": "/dev/sda1",
            "Ebs": {"VolumeSize": request.volume_size_gb, "DeleteOnTermination": true}
        }])
        .to_string();
        let tags = format!(
            "ResourceType=instance,Tags=[{{Key=Name,Value={}}}]",
            request.name
        );
        tracing::info!(name = %request.name, image = %request.image, region = %self.region, "creating ec2 instance");
        let out = self
            .ec2(&[
                "run-instances",
                "--image-id",
                &request.image,
                "--count",
                "1",
                "--instance-type",
                &request.instance_type,
                "--key-name",
                &request.key_name,
                "--security-groups",
                &request.security_group,
                "--block-device-mappings",
                &devices,
                "--tag-specifications",
                &tags,
            ])
            .await?;
        out.pointer("/Instances/0/InstanceId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::ProvisionFailure("run-instances returned no instance id".into()))
    }

    async fn get(&self, id: &str) -> Result<Instance> {
        let out = match self.ec2(&["describe-instances", "--instance-ids", id]).await {
            Ok(out) => out,
            Err(e) if failed_with(&e, NOT_FOUND) => return Ok(Instance::gone(id)),
            Err(e) => return Err(e),
        };
        let Some(raw) = out.pointer("/Reservations/0/Instances/0") else {
            return Ok(Instance::gone(id));
        };
        parse_instance(id, raw)
    }

    async fn terminate(&self, id: &str) -> Result<()> {
        tracing::info!(instance = %id, "terminating ec2 instance");
        self.ec2(&["terminate-instances", "--instance-ids", id]).await?;
        Ok(())
    }
}

fn parse_instance(id: &str, raw: &Value) -> Result<Instance> {
    let state = raw
        .pointer("/State/Name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::ProvisionFailure(format!("no state reported for {id}")))?;
    let text = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Ok(Instance {
        id: id.to_string(),
        state: InstanceState::parse(state),
        public_dns: text("PublicDnsName"),
        public_ip: text("PublicIpAddress"),
    })
}
