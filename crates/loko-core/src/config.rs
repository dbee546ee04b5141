//! Deployment configuration
//!
//! Loaded from `$XDG_CONFIG_HOME/loko/deploy.yaml` when present. The raw text
//! goes through `${VAR}` / `${VAR:-default}` substitution before parsing, so
//! secrets and per-machine paths can stay in the environment.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default orchestrator base image
pub const DEFAULT_ORCHESTRATOR_IMAGE: &str = "lokoai/loko-orchestrator:0.0.4-dev";
/// Default gateway image
pub const DEFAULT_GATEWAY_IMAGE: &str = "lokoai/loko-gateway:0.0.4-dev";
/// Default reverse proxy image used for TLS termination
pub const DEFAULT_PROXY_IMAGE: &str = "nginx:1.25-alpine";
/// Default image of the built-in predictor microservice
pub const DEFAULT_PREDICTOR_IMAGE: &str = "lokoai/ds4biz-predictor-dm:0.0.3-dev";

/// Top-level deployment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Root of the loko installation (holds `shared/` and `data/`)
    pub loko_home: PathBuf,
    /// Registry namespace that prefixes every built image
    pub company: Option<String>,
    /// Host port the gateway is published on
    pub gateway_port: u16,
    /// Hostname advertised to the orchestrator as its external gateway
    pub public_host: String,
    /// Fixed images
    pub images: ImagesConfig,
    /// Instance polling
    pub wait: WaitConfig,
    /// Remote host settings
    pub remote: RemoteConfig,
    /// Credentials used when pushing images
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryAuth>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            loko_home: default_loko_home(),
            company: None,
            gateway_port: 8080,
            public_host: "localhost".to_string(),
            images: ImagesConfig::default(),
            wait: WaitConfig::default(),
            remote: RemoteConfig::default(),
            registry: None,
        }
    }
}

/// Images that are not built from the project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Base image of the generated orchestrator image
    pub orchestrator_base: String,
    /// Gateway image
    pub gateway: String,
    /// Reverse proxy image
    pub proxy: String,
    /// Predictor microservice image
    pub predictor: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            orchestrator_base: DEFAULT_ORCHESTRATOR_IMAGE.to_string(),
            gateway: DEFAULT_GATEWAY_IMAGE.to_string(),
            proxy: DEFAULT_PROXY_IMAGE.to_string(),
            predictor: DEFAULT_PREDICTOR_IMAGE.to_string(),
        }
    }
}

/// Registry login, usually filled from `${VAR}` references
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    /// Registry user
    pub username: String,
    /// Password or access token
    pub password: String,
    /// Registry address; Docker Hub when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .field("server", &self.server)
            .finish()
    }
}

/// How long to wait for a new instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Seconds between state polls
    pub poll_interval_secs: u64,
    /// Give up after this many seconds
    pub timeout_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            timeout_secs: 600,
        }
    }
}

/// Remote host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// SSH login
    pub user: String,
    /// Directory the manifest is copied to and compose runs in
    pub directory: String,
    /// Install Docker on the instance before deploying
    pub bootstrap: bool,
    /// Attempts for each bootstrap command
    pub bootstrap_attempts: u32,
    /// Pause between bootstrap attempts
    pub bootstrap_delay_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            user: "ubuntu".to_string(),
            directory: "/home/ubuntu".to_string(),
            bootstrap: false,
            bootstrap_attempts: 5,
            bootstrap_delay_secs: 10,
        }
    }
}

fn default_loko_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("loko"))
        .unwrap_or_else(|| PathBuf::from("loko"))
}

impl DeployConfig {
    /// `$XDG_CONFIG_HOME/loko/deploy.yaml`, if a config directory is known
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("loko").join("deploy.yaml"))
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw, |name| std::env::var(name).ok())
    }

    /// Parse YAML text, substituting variables through `lookup`
    pub fn parse<F>(raw: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = substitute_env_vars(raw, lookup)?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: DeployConfig = serde_yaml::from_str(&text)?;
        config.loko_home = expand_home(&config.loko_home);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.wait.poll_interval_secs == 0 {
            return Err(Error::Config(
                "wait.poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.remote.bootstrap_attempts == 0 {
            return Err(Error::Config(
                "remote.bootstrap_attempts must be at least 1".to_string(),
            ));
        }
        if self.company.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(Error::Config("company must not be empty".to_string()));
        }
        Ok(())
    }

    /// The shared extension registry root
    pub fn extensions_root(&self) -> PathBuf {
        self.loko_home.join("shared").join("extensions")
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Substitute `${VAR}` and `${VAR:-default}` references
///
/// Every unresolved variable is reported at once.
pub fn substitute_env_vars<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| Error::Config(e.to_string()))?;
    let mut missing = Vec::new();
    let result = re.replace_all(input, |caps: &regex::Captures<'_>| {
        let expr = &caps[1];
        let (name, default) = match expr.find(":-") {
            Some(pos) => (&expr[..pos], Some(&expr[pos + 2..])),
            None => (expr, None),
        };
        match (lookup(name), default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                missing.push(name.to_string());
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(Error::EnvVarNotFound(missing.join(", ")));
    }
    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_substitute_env_vars() {
        let lookup = env(&[("REGISTRY", "acme")]);
        assert_eq!(
            substitute_env_vars("company: ${REGISTRY}", &lookup).unwrap(),
            "company: acme"
        );
        assert_eq!(
            substitute_env_vars("port: ${PORT:-9090}", &lookup).unwrap(),
            "port: 9090"
        );
    }

    #[test]
    fn test_substitute_reports_all_missing() {
        let err = substitute_env_vars("${A} ${B} ${C:-ok}", env(&[])).unwrap_err();
        match err {
            Error::EnvVarNotFound(names) => assert_eq!(names, "A, B"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = DeployConfig::default();
        assert_eq!(config.gateway_port, 8080);
        assert_eq!(config.wait.poll_interval_secs, 10);
        assert_eq!(config.wait.timeout_secs, 600);
        assert_eq!(config.remote.user, "ubuntu");
        assert_eq!(config.remote.directory, "/home/ubuntu");
        assert!(!config.remote.bootstrap);
        assert_eq!(config.images.gateway, DEFAULT_GATEWAY_IMAGE);
        assert!(config.loko_home.ends_with("loko"));
    }

    #[test]
    fn test_parse_partial_yaml() {
        let raw = r#"
loko_home: /srv/loko
company: ${COMPANY}
gateway_port: 9999
images:
  gateway: registry.local/gateway:1.0
remote:
  bootstrap: true
"#;
        let config = DeployConfig::parse(raw, env(&[("COMPANY", "acme")])).unwrap();
        assert_eq!(config.loko_home, PathBuf::from("/srv/loko"));
        assert_eq!(config.company.as_deref(), Some("acme"));
        assert_eq!(config.gateway_port, 9999);
        assert_eq!(config.images.gateway, "registry.local/gateway:1.0");
        assert_eq!(config.images.orchestrator_base, DEFAULT_ORCHESTRATOR_IMAGE);
        assert!(config.remote.bootstrap);
        assert_eq!(config.remote.bootstrap_attempts, 5);
        assert!(config.registry.is_none());
        assert_eq!(
            config.extensions_root(),
            PathBuf::from("/srv/loko/shared/extensions")
        );
    }

    #[test]
    fn test_registry_password_from_env() {
        let raw = "registry:\n  username: deployer\n  password: ${REGISTRY_TOKEN}\n";
        let config = DeployConfig::parse(raw, env(&[("REGISTRY_TOKEN", "s3cret")])).unwrap();
        let registry = config.registry.unwrap();
        assert_eq!(registry.password, "s3cret");
        assert!(registry.server.is_none());
        assert!(!format!("{registry:?}").contains("s3cret"));
    }

    #[test]
    fn test_parse_rejects_zero_interval() {
        let raw = "wait:\n  poll_interval_secs: 0\n";
        assert!(matches!(
            DeployConfig::parse(raw, env(&[])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeployConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, DeployConfig::default());
    }
}
