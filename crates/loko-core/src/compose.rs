//! Compose manifest emission

use crate::Result;
use crate::plan::{Plan, ServiceDefinition};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Compose file format version written to the manifest
pub const COMPOSE_VERSION: &str = "3.3";
/// File name of the manifest inside the project directory
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// A compose document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Format version
    pub version: String,
    /// Services keyed by name, in emission order
    pub services: IndexMap<String, ComposeService>,
}

/// One service entry; empty fields are left out of the document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    /// Image reference
    pub image: String,
    /// Port mappings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, String>,
    /// Volume binds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Networks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    /// Command override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Volume sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<String>,
}

impl From<&ServiceDefinition> for ComposeService {
    fn from(service: &ServiceDefinition) -> Self {
        Self {
            image: service.image.clone(),
            ports: service.ports.clone(),
            environment: service.environment.clone(),
            volumes: service.volumes.clone(),
            networks: service.networks.clone(),
            command: service.command.clone(),
            volumes_from: service.volumes_from.clone(),
        }
    }
}

/// Turn a plan into a compose document
///
/// Orchestrator and gateway come first, then local extensions, global
/// extensions, side containers, core services and the proxy.
pub fn emit(plan: &Plan) -> ComposeFile {
    let services = plan
        .services()
        .into_iter()
        .map(|service| (service.name.clone(), ComposeService::from(service)))
        .collect();
    ComposeFile {
        version: COMPOSE_VERSION.to_string(),
        services,
    }
}

impl ComposeFile {
    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write the manifest to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        tracing::info!(path = %path.display(), services = self.services.len(), "wrote compose manifest");
        Ok(())
    }

    /// Service names in document order
    pub fn service_names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }
}
