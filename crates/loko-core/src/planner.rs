//! Compiles a project and the extension registry into a [`Plan`]

use crate::config::{DeployConfig, ImagesConfig};
use crate::extension::{ExtensionConfig, ExtensionRegistry};
use crate::plan::{
    GATEWAY, GlobalExtension, LocalExtension, ORCHESTRATOR, PROXY, Plan, RoutingRule, RuleType,
    ServiceDefinition,
};
use crate::project::Project;
use crate::proxy;
use crate::{Error, Result};

/// Port every service listens on inside the deployment network
pub const INTERNAL_PORT: u16 = 8080;
/// Port of the orchestrator API
pub const ORCHESTRATOR_PORT: u16 = 8888;
/// Name of the built-in predictor microservice
pub const PREDICTOR: &str = "predictor";

/// Address of the gateway inside the deployment network
pub fn internal_gateway() -> String {
    format!("http://{GATEWAY}:{INTERNAL_PORT}")
}

const DOCKER_SOCKET: &str = "/var/run/docker.sock:/var/run/docker.sock";

/// Builds deployment plans
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    company: String,
    gateway_port: u16,
    public_host: String,
    images: ImagesConfig,
    https: bool,
    remote_directory: String,
}

impl PlanBuilder {
    /// A builder with default images and ports
    pub fn new(company: impl Into<String>) -> Self {
        let defaults = DeployConfig::default();
        Self {
            company: company.into(),
            gateway_port: defaults.gateway_port,
            public_host: defaults.public_host,
            images: defaults.images,
            https: false,
            remote_directory: defaults.remote.directory,
        }
    }

    /// A builder taking everything from `config`; `company` must be set
    pub fn from_config(config: &DeployConfig) -> Result<Self> {
        let company = config
            .company
            .clone()
            .ok_or_else(|| Error::Config("company is required to plan a deployment".into()))?;
        Ok(Self {
            company,
            gateway_port: config.gateway_port,
            public_host: config.public_host.clone(),
            images: config.images.clone(),
            https: false,
            remote_directory: config.remote.directory.clone(),
        })
    }

    /// Host port the gateway is published on
    pub fn gateway_port(mut self, port: u16) -> Self {
        self.gateway_port = port;
        self
    }

    /// Add a TLS terminating proxy
    pub fn https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    /// Override the fixed images
    pub fn images(mut self, images: ImagesConfig) -> Self {
        self.images = images;
        self
    }

    /// Hostname advertised as the external gateway
    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = host.into();
        self
    }

    fn external_gateway(&self) -> String {
        if self.https {
            format!("https://{}", self.public_host)
        } else {
            format!("http://{}:{}", self.public_host, self.gateway_port)
        }
    }

    fn with_gateway_pointers(&self, service: ServiceDefinition) -> ServiceDefinition {
        service
            .with_env("GATEWAY", internal_gateway())
            .with_env("EXTERNAL_GATEWAY", self.external_gateway())
    }

    fn side_containers(
        &self,
        owner: &str,
        config: &ExtensionConfig,
    ) -> Result<Vec<ServiceDefinition>> {
        config
            .side_containers
            .iter()
            .map(|(short, spec)| {
                let image = spec.image.clone().ok_or_else(|| {
                    Error::Config(format!("side container '{short}' of '{owner}' has no image"))
                })?;
                Ok(ServiceDefinition::new(format!("{owner}_{short}"), image).with_spec(spec))
            })
            .collect()
    }

    /// Build the plan for `project`
    ///
    /// Extensions referenced by the project but missing from `registry` are
    /// skipped with a warning.
    pub fn build(&self, project: &Project, registry: &ExtensionRegistry) -> Result<Plan> {
        if self.company.trim().is_empty() {
            return Err(Error::Config("company must not be empty".into()));
        }
        let slug = project.slug();
        let mut rules = vec![RoutingRule {
            name: ORCHESTRATOR.to_string(),
            host: ORCHESTRATOR.to_string(),
            port: ORCHESTRATOR_PORT,
            rule_type: RuleType::Orchestrator,
            scan: true,
        }];
        let mut side_containers = Vec::new();

        let mut local_extensions = Vec::new();
        if project.has_dockerfile() {
            let config = ExtensionConfig::load(project.path())?;
            let service = ServiceDefinition::new(&slug, format!("{}/{}", self.company, slug))
                .with_spec(&config.main);
            local_extensions.push(LocalExtension {
                service: self.with_gateway_pointers(service),
                root: project.path().to_path_buf(),
            });
            side_containers.extend(self.side_containers(&slug, &config)?);
            rules.push(RoutingRule::custom(&slug));
        }

        let mut global_extensions = Vec::new();
        for name in project.global_extensions() {
            let Some(extension) = registry.get(&name) else {
                tracing::warn!(extension = %name, "extension not found in registry, skipping");
                continue;
            };
            let config = extension.config()?;
            let service = ServiceDefinition::new(&name, format!("{}/{}", self.company, name))
                .with_spec(&config.main);
            side_containers.extend(self.side_containers(&name, &config)?);
            global_extensions.push(GlobalExtension {
                service: self.with_gateway_pointers(service),
                root: extension.root.clone(),
                descriptor: extension.descriptor.clone(),
                includes: config.includes.clone(),
            });
            rules.push(RoutingRule::custom(&name));
        }

        let mut core = Vec::new();
        for component in project.core_components() {
            if component == PREDICTOR {
                core.push(self.predictor());
                rules.push(RoutingRule {
                    name: PREDICTOR.to_string(),
                    host: PREDICTOR.to_string(),
                    port: INTERNAL_PORT,
                    rule_type: RuleType::Predictor,
                    scan: false,
                });
            } else {
                tracing::debug!(component = %component, "core component has no service of its own");
            }
        }

        let mut orchestrator =
            ServiceDefinition::new(ORCHESTRATOR, format!("{}/{}_orchestrator", self.company, slug));
        orchestrator.volumes.push(DOCKER_SOCKET.to_string());
        orchestrator.command = Some("python services.py".to_string());
        let orchestrator = self.with_gateway_pointers(orchestrator);

        let mut gateway = ServiceDefinition::new(GATEWAY, &self.images.gateway)
            .with_env("RULES", serde_json::to_string(&rules)?);
        gateway
            .ports
            .push(format!("{}:{}", self.gateway_port, INTERNAL_PORT));

        let proxy = self.https.then(|| {
            let mut service = ServiceDefinition::new(PROXY, &self.images.proxy);
            service.ports = vec!["80:80".to_string(), "443:443".to_string()];
            service.volumes = vec![
                format!("./{}:/etc/nginx/conf.d/default.conf:ro", proxy::CONFIG_FILE),
                format!("./{}:/etc/nginx/certs:ro", proxy::CERTS_DIR),
            ];
            service
        });

        let plan = Plan {
            namespace: project.name().to_string(),
            project_dir: project.path().to_path_buf(),
            orchestrator,
            orchestrator_base: self.images.orchestrator_base.clone(),
            gateway,
            local_extensions,
            global_extensions,
            side_containers,
            core,
            resources: project.required_resources(),
            rules,
            proxy,
        };
        plan.validate()?;

        tracing::info!(
            namespace = %plan.namespace,
            services = plan.services().len(),
            resources = plan.resources.len(),
            "plan ready"
        );
        Ok(plan)
    }

    fn predictor(&self) -> ServiceDefinition {
        let repo = format!("{}/predictors", self.remote_directory.trim_end_matches('/'));
        let mut service = ServiceDefinition::new(PREDICTOR, &self.images.predictor)
            .with_env("GATEWAY_URL", internal_gateway())
            .with_env("NETWORK_NAME", "default")
            .with_env("VOLUME_PATH", &repo);
        service.volumes = vec![
            format!("{repo}:/ds4biz-predictor-dm/repo"),
            DOCKER_SOCKET.to_string(),
        ];
        service
    }
}
