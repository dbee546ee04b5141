//! Deployment plan model

use crate::extension::{ContainerSpec, Include};
use crate::{Error, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Service name of the orchestrator
pub const ORCHESTRATOR: &str = "orchestrator";
/// Service name of the gateway
pub const GATEWAY: &str = "gateway";
/// Service name of the TLS reverse proxy
pub const PROXY: &str = "proxy";

/// One container in the deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Unique service name
    pub name: String,
    /// Image reference
    pub image: String,
    /// `host:container` port mappings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Environment variables, in declaration order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
    /// Volume binds (`local:remote[:mode]`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Networks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    /// Command override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Services whose volumes are mounted into this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<String>,
}

impl ServiceDefinition {
    /// A service with only a name and an image
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Apply the non-image settings of a container spec
    pub fn with_spec(mut self, spec: &ContainerSpec) -> Self {
        self.ports.extend(spec.ports.iter().cloned());
        for (k, v) in &spec.environment {
            self.environment.insert(k.clone(), v.clone());
        }
        self.volumes.extend(spec.volumes.iter().cloned());
        self.networks.extend(spec.networks.iter().cloned());
        if spec.command.is_some() {
            self.command = spec.command.clone();
        }
        self
    }

    /// Set one environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }
}

/// What a gateway rule points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// The orchestrator's API
    Orchestrator,
    /// An extension service
    Custom,
    /// The predictor microservice
    Predictor,
}

/// A gateway routing rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Route name
    pub name: String,
    /// Target host (a service name)
    pub host: String,
    /// Target port
    pub port: u16,
    /// Target kind
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// Whether the gateway scans the target for endpoints
    pub scan: bool,
}

impl RoutingRule {
    /// Rule for an extension service
    pub fn custom(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            host: name.clone(),
            name,
            port: 8080,
            rule_type: RuleType::Custom,
            scan: false,
        }
    }
}

/// A global extension selected for the deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalExtension {
    /// The service to run
    pub service: ServiceDefinition,
    /// Build context directory
    pub root: PathBuf,
    /// `components.json` descriptor
    pub descriptor: PathBuf,
    /// Files to bake into the image
    pub includes: Vec<Include>,
}

/// The local extension built from the project's own Dockerfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExtension {
    /// The service to run
    pub service: ServiceDefinition,
    /// Build context directory (the project directory)
    pub root: PathBuf,
}

/// A complete deployment plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Namespace derived from the project name
    pub namespace: String,
    /// Project directory
    pub project_dir: PathBuf,
    /// Orchestrator service
    pub orchestrator: ServiceDefinition,
    /// Base image the orchestrator image is built from
    pub orchestrator_base: String,
    /// Gateway service
    pub gateway: ServiceDefinition,
    /// Project-embedded extensions
    pub local_extensions: Vec<LocalExtension>,
    /// Registry extensions
    pub global_extensions: Vec<GlobalExtension>,
    /// Auxiliary services declared by extensions
    pub side_containers: Vec<ServiceDefinition>,
    /// Built-in microservices required by the graph
    pub core: Vec<ServiceDefinition>,
    /// Resource paths relative to the loko home
    pub resources: Vec<String>,
    /// Gateway routing rules
    pub rules: Vec<RoutingRule>,
    /// TLS termination proxy, when requested
    pub proxy: Option<ServiceDefinition>,
}

impl Plan {
    /// Every service in manifest order
    pub fn services(&self) -> Vec<&ServiceDefinition> {
        let mut all = vec![&self.orchestrator, &self.gateway];
        all.extend(self.local_extensions.iter().map(|e| &e.service));
        all.extend(self.global_extensions.iter().map(|e| &e.service));
        all.extend(self.side_containers.iter());
        all.extend(self.core.iter());
        all.extend(self.proxy.iter());
        all
    }

    /// Check that service names are unique across all categories
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for service in self.services() {
            if !seen.insert(service.name.as_str()) {
                return Err(Error::DuplicateService(service.name.clone()));
            }
        }
        Ok(())
    }

    /// Whether TLS termination is part of the deployment
    pub fn https(&self) -> bool {
        self.proxy.is_some()
    }

    /// Images this deployment builds, in build order
    pub fn built_images(&self) -> Vec<&str> {
        let mut images: Vec<&str> = self
            .local_extensions
            .iter()
            .map(|e| e.service.image.as_str())
            .collect();
        images.extend(self.global_extensions.iter().map(|e| e.service.image.as_str()));
        images.push(self.orchestrator.image.as_str());
        images
    }
}
