//! Extension configuration and the shared extension registry
//!
//! A global extension lives somewhere below `<loko_home>/shared/extensions` and
//! is recognised by its `extensions/components.json` descriptor. Its optional
//! `config.json` declares the default container settings, side containers and
//! extra files to bake into the image.

use crate::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the descriptor that marks an extension directory
pub const COMPONENTS_FILE: &str = "components.json";
/// Name of the extension configuration file
pub const CONFIG_FILE: &str = "config.json";

/// Container settings shared by the main container and side containers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSpec {
    /// Image reference (side containers only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Port mappings
    #[serde(deserialize_with = "de::ports")]
    pub ports: Vec<String>,
    /// Environment variables
    #[serde(deserialize_with = "de::environment")]
    pub environment: IndexMap<String, String>,
    /// Volume binds
    pub volumes: Vec<String>,
    /// Networks
    pub networks: Vec<String>,
    /// Command override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// A file or directory copied into an extension image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Include {
    /// Source path relative to the loko home
    pub source: String,
    /// Absolute destination path inside the image
    pub target: String,
}

/// Contents of an extension's `config.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionConfig {
    /// Settings for the extension's own container
    pub main: ContainerSpec,
    /// Auxiliary containers keyed by short name
    pub side_containers: IndexMap<String, ContainerSpec>,
    /// Extra files baked into the image
    pub includes: Vec<Include>,
}

impl ExtensionConfig {
    /// Read `<dir>/config.json`; a missing file yields the empty config
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// A global extension found in the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Extension name (its directory name)
    pub name: String,
    /// Extension directory, the build context of its image
    pub root: PathBuf,
    /// Path of its `components.json` descriptor
    pub descriptor: PathBuf,
}

impl Extension {
    /// Read this extension's `config.json`
    pub fn config(&self) -> Result<ExtensionConfig> {
        ExtensionConfig::load(&self.root)
    }

    /// Descriptor path relative to the registry's loko home, e.g.
    /// `shared/extensions/ocr/extensions/components.json`
    pub fn descriptor_relative_to(&self, loko_home: &Path) -> PathBuf {
        self.descriptor
            .strip_prefix(loko_home)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| {
                PathBuf::from("shared/extensions")
                    .join(&self.name)
                    .join("extensions")
                    .join(COMPONENTS_FILE)
            })
    }
}

/// Global extensions available on this machine
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    root: PathBuf,
    extensions: IndexMap<String, Extension>,
}

impl ExtensionRegistry {
    /// Scan `root` for extension descriptors
    ///
    /// A missing root is an empty registry. When two directories share a name
    /// the first in file-name order wins.
    pub fn discover(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut extensions = IndexMap::new();
        if !root.is_dir() {
            tracing::debug!(root = %root.display(), "extension registry not found");
            return Ok(Self { root, extensions });
        }

        let walker = ignore::WalkBuilder::new(&root)
            .standard_filters(false)
            .follow_links(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable registry entry");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_some_and(|t| t.is_dir())
                || path.file_name().is_none_or(|n| n != COMPONENTS_FILE)
            {
                continue;
            }
            let Some(marker_dir) = path.parent() else { continue };
            if marker_dir.file_name().is_none_or(|n| n != "extensions") {
                continue;
            }
            let Some(ext_root) = marker_dir.parent() else { continue };
            let Some(name) = ext_root.file_name().map(|n| n.to_string_lossy().to_string())
            else {
                continue;
            };
            extensions.entry(name.clone()).or_insert_with(|| Extension {
                name,
                root: ext_root.to_path_buf(),
                descriptor: path.to_path_buf(),
            });
        }

        tracing::debug!(count = extensions.len(), "discovered global extensions");
        Ok(Self { root, extensions })
    }

    /// Registry root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find an extension by name
    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.extensions.get(name)
    }

    /// Names of all discovered extensions
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    /// Number of discovered extensions
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether nothing was discovered
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

mod de {
    //! Lenient decoders for fields the editor writes in more than one shape

    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Ports as a list (`["8080:80"]`) or a map (`{"80": 8080}`, container to host)
    pub fn ports<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items.iter().map(scalar).collect(),
            Value::Object(map) => map
                .iter()
                .map(|(container, host)| match host {
                    Value::Null => container.clone(),
                    host => format!("{}:{}", scalar(host), container),
                })
                .collect(),
            Value::Null => Vec::new(),
            other => vec![scalar(&other)],
        })
    }

    /// Environment as a map or as a list of `KEY=value` strings
    pub fn environment<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<IndexMap<String, String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), scalar(v))).collect(),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    let item = scalar(item);
                    match item.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (item, String::new()),
                    }
                })
                .collect(),
            _ => IndexMap::new(),
        })
    }

    fn scalar(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_extension(root: &Path, rel: &str, config: Option<&str>) -> PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(dir.join("extensions")).unwrap();
        fs::write(dir.join("extensions").join(COMPONENTS_FILE), "[]").unwrap();
        if let Some(config) = config {
            fs::write(dir.join(CONFIG_FILE), config).unwrap();
        }
        dir
    }

    #[test]
    fn test_discover_nested_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("shared/extensions");
        write_extension(&root, "ocr", None);
        write_extension(&root, "vendor/nlp", None);
        fs::create_dir_all(root.join("not_an_extension")).unwrap();
        fs::write(root.join("not_an_extension").join(COMPONENTS_FILE), "[]").unwrap();

        let registry = ExtensionRegistry::discover(&root).unwrap();
        let mut names: Vec<_> = registry.names().collect();
        names.sort();
        assert_eq!(names, vec!["nlp", "ocr"]);

        let nlp = registry.get("nlp").unwrap();
        assert_eq!(nlp.root, root.join("vendor/nlp"));
        assert_eq!(
            nlp.descriptor_relative_to(tmp.path()),
            PathBuf::from("shared/extensions/vendor/nlp/extensions/components.json")
        );
        assert!(registry.get("not_an_extension").is_none());
    }

    #[test]
    fn test_missing_registry_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ExtensionRegistry::discover(tmp.path().join("nope")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_config_shapes() {
        let config: ExtensionConfig = serde_json::from_str(
            r#"{
                "main": {"environment": ["MODE=fast", "DEBUG"], "ports": {"8080": 9000}},
                "side_containers": {
                    "redis": {"image": "redis:7", "ports": ["6379:6379"], "environment": {"X": 1}}
                },
                "includes": [{"source": "data/dicts", "target": "/app/dicts"}]
            }"#,
        )
        .unwrap();

        assert_eq!(config.main.environment["MODE"], "fast");
        assert_eq!(config.main.environment["DEBUG"], "");
        assert_eq!(config.main.ports, vec!["9000:8080"]);
        let redis = &config.side_containers["redis"];
        assert_eq!(redis.image.as_deref(), Some("redis:7"));
        assert_eq!(redis.environment["X"], "1");
        assert_eq!(config.includes[0].target, "/app/dicts");
    }

    #[test]
    fn test_extension_config_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(
            ExtensionConfig::load(tmp.path()).unwrap(),
            ExtensionConfig::default()
        );
    }
}
