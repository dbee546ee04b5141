//! One instance per project
//!
//! The instance hosting a project is recorded in the project's `plan.json`.
//! `init` reuses a recorded instance that is still running, replaces one the
//! provider has already deleted, and refuses anything in between so a
//! project never ends up with two instances.

use crate::instance::{Instance, InstanceState};
use crate::provider::{CloudProvider, CreateRequest};
use crate::{Error, Result};
use loko_core::config::WaitConfig;
use loko_core::{CloudState, StateStore};
use std::time::Duration;

/// How to wait for a new instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Pause between polls
    pub interval: Duration,
    /// Give up after this long
    pub timeout: Duration,
}

impl From<&WaitConfig> for WaitPolicy {
    fn from(config: &WaitConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from(&WaitConfig::default())
    }
}

/// Creates, inspects and destroys the project instance
pub struct Provisioner<P> {
    provider: P,
    store: StateStore,
    wait: WaitPolicy,
}

impl<P: CloudProvider> Provisioner<P> {
    /// Manage the instance recorded in `store` through `provider`
    pub fn new(provider: P, store: StateStore) -> Self {
        Self {
            provider,
            store,
            wait: WaitPolicy::default(),
        }
    }

    /// Override the wait policy
    pub fn wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// The backend in use
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The recorded instance, if it belongs to this provider
    pub fn recorded(&self) -> Result<Option<CloudState>> {
        let Some(cloud) = self.store.load()?.cloud else {
            return Ok(None);
        };
        if cloud.provider != self.provider.kind() {
            return Err(Error::ProviderMismatch {
                expected: self.provider.kind(),
                found: cloud.provider,
            });
        }
        Ok(Some(cloud))
    }

    /// Make sure the project has a running instance
    ///
    /// A recorded running instance is returned as is. A new instance that
    /// cannot be recorded is terminated again.
    pub async fn init(&self, request: &CreateRequest) -> Result<Instance> {
        if let Some(cloud) = self.recorded()? {
            let instance = self.provider.get(&cloud.instance).await?;
            match &instance.state {
                InstanceState::Running => {
                    tracing::info!(instance = %instance.id, "reusing running instance");
                    return Ok(instance);
                }
                state if state.is_gone() => {
                    tracing::warn!(instance = %instance.id, state = %state, "recorded instance is gone, creating a new one");
                    self.store.clear_cloud()?;
                }
                state => {
                    return Err(Error::InstanceNotRunning {
                        id: instance.id.clone(),
                        state: state.to_string(),
                    });
                }
            }
        }

        let id = self.provider.create(request).await?;
        let cloud = CloudState {
            provider: self.provider.kind(),
            region: self.provider.region().map(str::to_string),
            instance: id.clone(),
        };
        if let Err(e) = self.store.update(|state| state.cloud = Some(cloud)) {
            tracing::error!(instance = %id, error = %e, "could not record new instance, terminating it");
            if let Err(term) = self.provider.terminate(&id).await {
                tracing::error!(instance = %id, error = %term, "instance is still running and unrecorded");
            }
            return Err(e.into());
        }
        tracing::info!(instance = %id, "instance created, waiting for it to run");
        self.wait_until_running(&id).await
    }

    /// Poll until `id` is running
    ///
    /// An id the provider does not know yet is polled like a pending one.
    pub async fn wait_until_running(&self, id: &str) -> Result<Instance> {
        let started = tokio::time::Instant::now();
        loop {
            let instance = self.provider.get(id).await?;
            match &instance.state {
                InstanceState::Running => return Ok(instance),
                InstanceState::Pending | InstanceState::Missing => {}
                state => {
                    return Err(Error::InstanceNotRunning {
                        id: id.to_string(),
                        state: state.to_string(),
                    });
                }
            }
            if started.elapsed() >= self.wait.timeout {
                return Err(Error::Timeout {
                    id: id.to_string(),
                    secs: self.wait.timeout.as_secs(),
                });
            }
            tracing::debug!(instance = %id, state = %instance.state, "waiting for running state");
            tokio::time::sleep(self.wait.interval).await;
        }
    }

    /// The recorded instance, or `None` when there is none
    pub async fn info(&self) -> Result<Option<Instance>> {
        match self.recorded()? {
            Some(cloud) => Ok(Some(self.provider.get(&cloud.instance).await?)),
            None => Ok(None),
        }
    }

    /// The recorded instance; fails when there is none
    pub async fn current(&self) -> Result<Instance> {
        let cloud = self.recorded()?.ok_or(Error::MissingInstance)?;
        self.provider.get(&cloud.instance).await
    }

    /// Terminate the recorded instance and forget it; returns its id
    pub async fn destroy(&self) -> Result<String> {
        let cloud = self.recorded()?.ok_or(Error::MissingInstance)?;
        tracing::info!(instance = %cloud.instance, provider = %cloud.provider, "terminating");
        self.provider.terminate(&cloud.instance).await?;
        self.store.clear_cloud()?;
        Ok(cloud.instance)
    }
}
