//! Compose deployment over SSH
//!
//! The manifest (plus proxy files when TLS is on) is copied to the remote
//! directory, then the stack is restarted with a fixed command sequence.
//! Every output line is forwarded to the sink; the first failing command
//! stops the deployment.

use crate::instance::Instance;
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use command_executor::{Command, Launcher, ProcessEventType, ProcessHandle, SshConfig, SshLauncher};
use futures::StreamExt;
use loko_core::config::RemoteConfig;
use loko_core::{LogEvent, LogSink};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Commands run in the remote directory, in order
pub const DEPLOY_SEQUENCE: [&str; 3] = [
    "docker-compose down",
    "docker-compose pull",
    "docker-compose up -d",
];

const SINK_SOURCE: &str = "ssh";

/// Docker installation steps for a fresh Ubuntu host
pub fn bootstrap_commands(user: &str) -> Vec<String> {
    vec![
        "curl -fsSL https://get.docker.com -o get-docker.sh".to_string(),
        "sudo sh get-docker.sh".to_string(),
        format!("sudo usermod -aG docker {user}"),
    ]
}

/// Connection and behaviour settings for remote deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    /// SSH login
    pub user: String,
    /// Remote working directory
    pub directory: String,
    /// Private key
    pub key_path: PathBuf,
    /// Multiplexing socket, so all commands share one session
    pub control_path: Option<PathBuf>,
    /// Install Docker before deploying
    pub bootstrap: bool,
    /// Retry policy for bootstrap commands
    pub retry: RetryPolicy,
}

impl RemoteSettings {
    /// Settings from the `remote` config section and a key file
    pub fn from_config(config: &RemoteConfig, key_path: impl Into<PathBuf>) -> Self {
        Self {
            user: config.user.clone(),
            directory: config.directory.clone(),
            key_path: key_path.into(),
            control_path: Some(std::env::temp_dir().join("loko-ssh-%C")),
            bootstrap: config.bootstrap,
            retry: RetryPolicy::new(
                config.bootstrap_attempts,
                Duration::from_secs(config.bootstrap_delay_secs),
            ),
        }
    }
}

/// Deploys a compose manifest to an instance
pub struct RemoteDeployer<L, S> {
    launcher: L,
    settings: RemoteSettings,
    sink: S,
}

impl<L, S> RemoteDeployer<L, S>
where
    L: Launcher + Clone,
    S: LogSink,
{
    /// Run `ssh`/`scp` through `launcher`
    pub fn new(launcher: L, settings: RemoteSettings, sink: S) -> Self {
        Self {
            launcher,
            settings,
            sink,
        }
    }

    fn connect(&self, instance: &Instance) -> Result<SshLauncher<L>> {
        let address = instance
            .address()
            .ok_or_else(|| Error::NoAddress(instance.id.clone()))?;
        let mut config = SshConfig::new(address)
            .with_user(&self.settings.user)
            .with_identity_file(&self.settings.key_path);
        if let Some(control) = &self.settings.control_path {
            config = config.with_control_path(control);
        }
        config.check_identity()?;
        Ok(SshLauncher::new(self.launcher.clone(), config))
    }

    /// Copy `files` to the instance and restart the stack
    pub async fn deploy(&self, instance: &Instance, files: &[PathBuf]) -> Result<()> {
        if !instance.state.is_running() {
            return Err(Error::DeployPrecondition {
                id: instance.id.clone(),
                state: instance.state.to_string(),
            });
        }
        let ssh = self.connect(instance)?;
        tracing::info!(instance = %instance.id, host = %ssh.config().host(), "deploying");

        if self.settings.bootstrap {
            self.bootstrap(&ssh).await?;
            // The docker group only applies to sessions opened after usermod.
            if ssh.close_master().await? {
                tracing::debug!(instance = %instance.id, "closed ssh master after bootstrap");
            }
        }

        for file in files {
            let remote = self.remote_path(file);
            ssh.copy_to(file, &remote).await?;
            self.sink
                .emit(LogEvent::info(SINK_SOURCE, format!("copied {}", remote)));
        }

        for step in DEPLOY_SEQUENCE {
            self.run(&ssh, step).await?;
        }
        self.sink.emit(LogEvent::info(SINK_SOURCE, "deployment done"));
        Ok(())
    }

    async fn bootstrap(&self, ssh: &SshLauncher<L>) -> Result<()> {
        for line in bootstrap_commands(&self.settings.user) {
            self.settings
                .retry
                .run(&line, || self.run(ssh, &line))
                .await?;
        }
        Ok(())
    }

    fn remote_path(&self, file: &Path) -> String {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.settings.directory.trim_end_matches('/'), name)
    }

    /// Run one command line in the remote directory, forwarding its output
    pub async fn run(&self, ssh: &SshLauncher<L>, line: &str) -> Result<()> {
        let mut parts = line.split_whitespace();
        let program = parts.next().unwrap_or_default();
        let command = Command::builder(program)
            .args(parts)
            .current_dir(&self.settings.directory)
            .build();

        self.sink.emit(LogEvent::info(SINK_SOURCE, format!("$ {line}")));
        let (mut events, mut handle) = ssh.launch(command).await?;
        while let Some(event) = events.next().await {
            match (&event.event_type, event.data) {
                (ProcessEventType::Stdout | ProcessEventType::Stderr, Some(text)) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        self.sink.emit(LogEvent::info(SINK_SOURCE, text));
                    }
                }
                (ProcessEventType::Started { pid }, _) => {
                    tracing::debug!(pid, command = %line, "remote command started");
                }
                _ => {}
            }
        }

        let status = handle.wait().await?;
        if !status.success() {
            self.sink
                .emit(LogEvent::error(SINK_SOURCE, format!("`{line}` failed")));
            return Err(Error::RemoteCommand {
                command: line.to_string(),
                code: status.code,
            });
        }
        Ok(())
    }
}
