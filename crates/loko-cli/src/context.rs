//! Per-invocation settings shared by every command

use anyhow::{Context as _, Result, bail};
use cloud_deploy::{
    AwsProvider, AzureProvider, CloudProvider, Provisioner, SystemCli, WaitPolicy, aws, azure,
};
use loko_core::compose::COMPOSE_FILE;
use loko_core::{CloudState, DeployConfig, Project, ProviderKind, StateStore};
use std::path::{Path, PathBuf};

/// Key file used when `--key-path` is not given
pub const DEFAULT_KEY_PATH: &str = "ec2-keypair.pem";

pub struct Context {
    pub config: DeployConfig,
    pub project_dir: PathBuf,
    pub store: StateStore,
}

impl Context {
    /// Resolve the configuration and the project directory
    ///
    /// An explicit config path must exist; the default one is optional.
    pub fn load(config_path: Option<&Path>, project_dir: &Path) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file {} not found", path.display());
                }
                DeployConfig::load(path)
                    .with_context(|| format!("failed to load config {}", path.display()))?
            }
            None => match DeployConfig::default_path() {
                Some(path) => DeployConfig::load(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => DeployConfig::default(),
            },
        };

        let project_dir = project_dir
            .canonicalize()
            .with_context(|| format!("project directory {} not found", project_dir.display()))?;
        let store = StateStore::for_project(&project_dir);
        tracing::debug!(project = %project_dir.display(), loko_home = %config.loko_home.display(), "context loaded");

        Ok(Self {
            config,
            project_dir,
            store,
        })
    }

    pub fn project(&self) -> Result<Project> {
        Project::load(&self.project_dir)
            .with_context(|| format!("failed to read project in {}", self.project_dir.display()))
    }

    /// Directory name, the default instance name
    pub fn slug(&self) -> String {
        self.project_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "loko".to_string())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_dir.join(COMPOSE_FILE)
    }

    pub fn provisioner<P: CloudProvider>(&self, provider: P) -> Provisioner<P> {
        Provisioner::new(provider, self.store.clone()).wait_policy(WaitPolicy::from(&self.config.wait))
    }

    /// Provider able to manage the instance recorded in `cloud`
    pub fn recorded_provider(&self, cloud: &CloudState) -> Box<dyn CloudProvider> {
        match cloud.provider {
            ProviderKind::Aws => {
                let region = cloud.region.as_deref().unwrap_or(aws::DEFAULT_REGION);
                Box::new(AwsProvider::new(SystemCli::new(), region))
            }
            ProviderKind::Azure => {
                let location = cloud.region.as_deref().unwrap_or(azure::DEFAULT_LOCATION);
                Box::new(
                    AzureProvider::new(SystemCli::new(), location)
                        .admin_user(&self.config.remote.user),
                )
            }
        }
    }
}

/// Name of the registered key pair: the key file name without extension
pub fn key_name(key_path: &Path) -> Result<String> {
    key_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .with_context(|| format!("cannot derive a key name from {}", key_path.display()))
}
