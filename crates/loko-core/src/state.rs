//! Persisted per-project state (`plan.json`)
//!
//! This is the only data that survives between invocations: the TLS flag and
//! the cloud instance hosting the project. Every change is a load, modify and
//! atomic rewrite so fields set by other commands are never lost.

use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the state file inside the project directory
pub const STATE_FILE: &str = "plan.json";

/// Cloud provider hosting an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Amazon EC2
    Aws,
    /// Azure virtual machines
    Azure,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Aws => f.write_str("aws"),
            ProviderKind::Azure => f.write_str("azure"),
        }
    }
}

/// The instance currently hosting the project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudState {
    /// Provider tag
    #[serde(rename = "type")]
    pub provider: ProviderKind,
    /// Region the instance was created in
    #[serde(default)]
    pub region: Option<String>,
    /// Provider instance id (an EC2 id or an Azure resource id)
    pub instance: String,
}

/// Contents of `plan.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Whether the deployment terminates TLS
    #[serde(default)]
    pub https: bool,
    /// Host port the gateway was published on by the last plan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_port: Option<u16>,
    /// Active instance, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudState>,
    /// Keys this version does not know about, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reads and writes a project's `plan.json`
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store for `<project_dir>/plan.json`
    pub fn for_project(project_dir: &Path) -> Self {
        Self::new(project_dir.join(STATE_FILE))
    }

    /// Store backed by an explicit file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current state; a missing file is the empty state
    pub fn load(&self) -> Result<PersistedState> {
        if !self.path.exists() {
            return Ok(PersistedState::default());
        }
        let text = std::fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(PersistedState::default());
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Load, apply `f`, and write back atomically; returns the new state
    pub fn update<F>(&self, f: F) -> Result<PersistedState>
    where
        F: FnOnce(&mut PersistedState),
    {
        let mut state = self.load()?;
        f(&mut state);
        self.write(&state)?;
        Ok(state)
    }

    /// Remove the `cloud` entry, keeping everything else
    pub fn clear_cloud(&self) -> Result<PersistedState> {
        self.update(|state| state.cloud = None)
    }

    fn write(&self, state: &PersistedState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        tracing::debug!(path = %self.path.display(), "saved state");
        Ok(())
    }
}
