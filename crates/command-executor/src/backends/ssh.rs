//! SSH remote execution backend using the system `ssh` and `scp` clients

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::launcher::Launcher;

/// How long a multiplexed master connection lingers after the last client exits
const CONTROL_PERSIST: &str = "60";

/// SSH connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    host: String,
    user: Option<String>,
    identity_file: Option<PathBuf>,
    control_path: Option<PathBuf>,
}

impl SshConfig {
    /// Create a new SSH configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            identity_file: None,
            control_path: None,
        }
    }

    /// Set the SSH user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the identity file (private key)
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Share one TCP connection between consecutive commands through a control socket
    pub fn with_control_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_path = Some(path.into());
        self
    }

    /// The remote host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the host string (user@host if user is specified)
    pub fn host_string(&self) -> String {
        if let Some(user) = &self.user {
            format!("{}@{}", user, self.host)
        } else {
            self.host.clone()
        }
    }

    /// Fail early when a configured identity file is missing
    pub fn check_identity(&self) -> Result<()> {
        match &self.identity_file {
            Some(path) if !path.is_file() => Err(Error::SshKeyNotFound {
                path: path.display().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Options shared by `ssh` and `scp`
    ///
    /// `BatchMode` turns a rejected key into an error instead of a password prompt.
    fn common_options(&self, cmd: &mut Command) {
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-o").arg("StrictHostKeyChecking=accept-new");
        if let Some(control) = &self.control_path {
            cmd.arg("-o").arg("ControlMaster=auto");
            cmd.arg("-o").arg(format!("ControlPath={}", control.display()));
            cmd.arg("-o").arg(format!("ControlPersist={}", CONTROL_PERSIST));
        }
    }

    /// Build the `ssh` invocation that runs `command` on the remote host
    pub fn ssh_command(&self, command: &Command) -> Command {
        let mut ssh_cmd = Command::new("ssh");
        self.common_options(&mut ssh_cmd);
        ssh_cmd.arg(self.host_string());
        ssh_cmd.arg(format_remote_command(command));
        ssh_cmd
    }

    /// Build the `scp` invocation that copies a local file or directory to `remote_path`
    pub fn scp_command(&self, local: &Path, remote_path: &str) -> Command {
        let mut scp_cmd = Command::new("scp");
        if local.is_dir() {
            scp_cmd.arg("-r");
        }
        self.common_options(&mut scp_cmd);
        scp_cmd.arg(local);
        scp_cmd.arg(format!("{}:{}", self.host_string(), remote_path));
        scp_cmd
    }

    /// Build the `ssh -O exit` invocation that stops the multiplexing master
    ///
    /// `None` when no control path is configured.
    pub fn close_master_command(&self) -> Option<Command> {
        let control = self.control_path.as_ref()?;
        let mut cmd = Command::new("ssh");
        cmd.arg("-o").arg(format!("ControlPath={}", control.display()));
        cmd.arg("-O").arg("exit");
        cmd.arg(self.host_string());
        Some(cmd)
    }
}

/// SSH launcher that wraps another launcher for remote execution
#[derive(Debug, Clone)]
pub struct SshLauncher<L> {
    inner: L,
    config: SshConfig,
}

impl<L> SshLauncher<L> {
    /// Create a new SSH launcher wrapping the given inner launcher
    pub fn new(inner: L, config: SshConfig) -> Self {
        Self { inner, config }
    }

    /// The connection settings used for every command
    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

impl<L: Launcher> SshLauncher<L> {
    /// Copy a local file or directory to the remote host
    pub async fn copy_to(&self, local: &Path, remote_path: &str) -> Result<()> {
        self.config.check_identity()?;
        let scp_cmd = self.config.scp_command(local, remote_path);
        let line = scp_cmd.to_shell_string();
        tracing::debug!(command = %line, "copying to remote host");
        self.inner.execute(scp_cmd).await?.ensure_success(line)?;
        Ok(())
    }

    /// Stop the shared master connection so the next command logs in afresh
    ///
    /// Returns whether a master was stopped. Having none running is not an error.
    pub async fn close_master(&self) -> Result<bool> {
        let Some(cmd) = self.config.close_master_command() else {
            return Ok(false);
        };
        let line = cmd.to_shell_string();
        let output = self.inner.execute(cmd).await?;
        if output.status.success() {
            tracing::debug!(command = %line, "closed ssh master connection");
            Ok(true)
        } else {
            tracing::debug!(command = %line, code = ?output.status.code, "no ssh master to close");
            Ok(false)
        }
    }
}

#[async_trait]
impl<L> Launcher for SshLauncher<L>
where
    L: Launcher,
{
    type EventStream = L::EventStream;
    type Handle = L::Handle;

    async fn launch(&self, command: Command) -> Result<(Self::EventStream, Self::Handle)> {
        self.config.check_identity()?;
        let ssh_cmd = self.config.ssh_command(&command);
        self.inner.launch(ssh_cmd).await
    }
}

/// Format a command for remote execution via SSH
///
/// Environment variables are passed through `env` in sorted order and a
/// working directory becomes a leading `cd`.
fn format_remote_command(cmd: &Command) -> String {
    let mut line = cmd.to_shell_string();
    if !cmd.get_envs().is_empty() {
        let mut vars: Vec<String> = cmd
            .get_envs()
            .iter()
            .map(|(k, v)| {
                crate::command::shell_escape(&format!(
                    "{}={}",
                    k.to_string_lossy(),
                    v.to_string_lossy()
                ))
            })
            .collect();
        vars.sort();
        line = format!("env {} {}", vars.join(" "), line);
    }
    match cmd.get_current_dir() {
        Some(dir) => format!(
            "cd {} && {}",
            crate::command::shell_escape(&dir.to_string_lossy()),
            line
        ),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_ssh_config() {
        let config = SshConfig::new("example.com")
            .with_user("alice")
            .with_identity_file("/home/alice/.ssh/id_rsa");

        assert_eq!(config.host_string(), "alice@example.com");
        assert_eq!(config.host(), "example.com");
        assert_eq!(SshConfig::new("example.com").host_string(), "example.com");
    }

    #[test]
    fn test_ssh_command_layout() {
        let config = SshConfig::new("10.0.0.5")
            .with_user("ubuntu")
            .with_identity_file("/keys/demo.pem")
            .with_control_path("/tmp/ctl-%r@%h");
        let remote = Command::builder("docker-compose")
            .arg("up")
            .arg("-d")
            .current_dir("/home/ubuntu")
            .build();

        let cmd = config.ssh_command(&remote);
        assert_eq!(cmd.get_program(), "ssh");
        assert_eq!(
            args_of(&cmd),
            vec![
                "-i",
                "/keys/demo.pem",
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ControlMaster=auto",
                "-o",
                "ControlPath=/tmp/ctl-%r@%h",
                "-o",
                "ControlPersist=60",
                "ubuntu@10.0.0.5",
                "cd /home/ubuntu && docker-compose up -d",
            ]
        );
    }

    #[test]
    fn test_plain_ssh_command_never_prompts() {
        let config = SshConfig::new("host");
        let cmd = config.ssh_command(&Command::new("true"));
        assert_eq!(
            args_of(&cmd),
            vec!["-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new", "host", "true"]
        );
    }

    #[test]
    fn test_remote_command_forwards_env() {
        let cmd = Command::builder("docker-compose")
            .arg("up")
            .env("COMPOSE_PROJECT_NAME", "shop")
            .env("AWS_PAGER", "")
            .current_dir("/srv/loko")
            .build();

        assert_eq!(
            format_remote_command(&cmd),
            "cd /srv/loko && env AWS_PAGER= COMPOSE_PROJECT_NAME=shop docker-compose up"
        );
        assert_eq!(format_remote_command(&Command::new("true")), "true");
    }

    #[test]
    fn test_close_master_command() {
        assert!(SshConfig::new("host").close_master_command().is_none());

        let config = SshConfig::new("10.0.0.5")
            .with_user("ubuntu")
            .with_control_path("/tmp/ctl-%C");
        let cmd = config.close_master_command().unwrap();
        assert_eq!(cmd.get_program(), "ssh");
        assert_eq!(
            args_of(&cmd),
            vec!["-o", "ControlPath=/tmp/ctl-%C", "-O", "exit", "ubuntu@10.0.0.5"]
        );
    }

    #[test]
    fn test_scp_command_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("docker-compose.yml");
        std::fs::write(&file, "version: '3.3'\n").unwrap();

        let config = SshConfig::new("1.2.3.4").with_user("ubuntu");
        let cmd = config.scp_command(&file, "/home/ubuntu/docker-compose.yml");

        assert_eq!(cmd.get_program(), "scp");
        let args = cmd.get_args();
        assert!(!args.contains(&OsString::from("-r")));
        assert!(args.contains(&OsString::from("BatchMode=yes")));
        assert_eq!(
            args.last().unwrap(),
            &OsString::from("ubuntu@1.2.3.4:/home/ubuntu/docker-compose.yml")
        );
    }

    #[test]
    fn test_scp_command_for_directory_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let config = SshConfig::new("1.2.3.4");
        let cmd = config.scp_command(dir.path(), "/srv/certs");
        assert!(cmd.get_args().contains(&OsString::from("-r")));
    }

    #[test]
    fn test_missing_identity_file() {
        let config = SshConfig::new("host").with_identity_file("/definitely/not/here.pem");
        match config.check_identity() {
            Err(Error::SshKeyNotFound { path }) => assert_eq!(path, "/definitely/not/here.pem"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(SshConfig::new("host").check_identity().is_ok());
    }
}
