//! Provider-neutral instance view

use std::fmt;

/// Lifecycle state of an instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    /// Being created or started
    Pending,
    /// Up
    Running,
    /// Shutting down
    Stopping,
    /// Stopped or deallocated
    Stopped,
    /// Being deleted or already deleted
    Terminated,
    /// The provider does not know the id (deleted long ago, or not visible yet)
    Missing,
    /// Anything the provider reports that is not covered above
    Other(String),
}

impl InstanceState {
    /// Map a provider state name (`running`, `VM running`, `shutting-down`, ...)
    pub fn parse(raw: &str) -> Self {
        let name = raw.trim();
        let name = name.strip_prefix("VM ").unwrap_or(name).to_ascii_lowercase();
        match name.as_str() {
            "pending" | "starting" | "creating" => Self::Pending,
            "running" => Self::Running,
            "stopping" | "deallocating" => Self::Stopping,
            "stopped" | "deallocated" => Self::Stopped,
            "terminated" | "shutting-down" | "deleting" => Self::Terminated,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    /// Whether the instance can take deployments
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether the instance is gone for good
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Terminated | Self::Missing)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Stopped => f.write_str("stopped"),
            Self::Terminated => f.write_str("terminated"),
            Self::Missing => f.write_str("not found"),
            Self::Other(state) => f.write_str(state),
        }
    }
}

/// A snapshot of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Provider id
    pub id: String,
    /// Current state
    pub state: InstanceState,
    /// Public DNS name, when the provider assigns one
    pub public_dns: Option<String>,
    /// Public IP address
    pub public_ip: Option<String>,
}

impl Instance {
    /// An instance the provider no longer knows about
    pub fn gone(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: InstanceState::Missing,
            public_dns: None,
            public_ip: None,
        }
    }

    /// Address to reach the instance at: DNS name if known, else the IP
    pub fn address(&self) -> Option<&str> {
        self.public_dns
            .as_deref()
            .filter(|dns| !dns.is_empty())
            .or(self.public_ip.as_deref().filter(|ip| !ip.is_empty()))
    }
}
