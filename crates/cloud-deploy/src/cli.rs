//! Provider command line tools
//!
//! Both backends are driven through their official CLIs (`aws`, `az`), which
//! pick up credentials the same way an operator's shell does. Every call
//! asks for JSON output and gets the parsed document back.

use crate::{Error, Result};
use async_trait::async_trait;
use command_executor::{Command, Launcher, LocalLauncher};
use serde_json::Value;

/// Environment that keeps the provider CLIs from paging or colouring output
const NON_INTERACTIVE_ENV: [(&str, &str); 2] =
    [("AWS_PAGER", ""), ("AZURE_CORE_NO_COLOR", "true")];

/// Runs a provider CLI and parses its JSON output
#[async_trait]
pub trait CloudCli: Send + Sync {
    /// Run `program args...`; empty output parses as `null`
    async fn run_json(&self, program: &str, args: &[String]) -> Result<Value>;
}

#[async_trait]
impl<T: CloudCli + ?Sized> CloudCli for &T {
    async fn run_json(&self, program: &str, args: &[String]) -> Result<Value> {
        (**self).run_json(program, args).await
    }
}

#[async_trait]
impl<T: CloudCli + ?Sized> CloudCli for std::sync::Arc<T> {
    async fn run_json(&self, program: &str, args: &[String]) -> Result<Value> {
        (**self).run_json(program, args).await
    }
}

/// [`CloudCli`] running the real binaries
#[derive(Debug, Clone, Default)]
pub struct SystemCli<L = LocalLauncher> {
    launcher: L,
}

impl SystemCli {
    /// Run binaries on this machine
    pub fn new() -> Self {
        Self::default()
    }
}

impl<L: Launcher> SystemCli<L> {
    /// Run binaries through `launcher`
    pub fn with_launcher(launcher: L) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl<L: Launcher> CloudCli for SystemCli<L> {
    async fn run_json(&self, program: &str, args: &[String]) -> Result<Value> {
        let mut builder = Command::builder(program).args(args);
        for (key, value) in NON_INTERACTIVE_ENV {
            builder = builder.env(key, value);
        }
        let command = builder.build();
        let line = command.to_shell_string();
        tracing::debug!(command = %line, "running provider cli");
        let output = self.launcher.execute(command).await?.ensure_success(line)?;
        parse_output(&output.stdout)
    }
}

/// Parse CLI output, treating blank output as `null`
pub fn parse_output(stdout: &str) -> Result<Value> {
    if stdout.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(stdout)?)
}

/// Whether `err` is a failed CLI call whose stderr mentions one of `markers`
pub(crate) fn failed_with(err: &Error, markers: &[&str]) -> bool {
    match err {
        Error::CommandExecutor(command_executor::Error::CommandFailed { stderr, .. }) => {
            markers.iter().any(|m| stderr.contains(m))
        }
        _ => false,
    }
}

/// Owned argument list from string slices
pub(crate) fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output() {
        assert_eq!(parse_output("  \n").unwrap(), Value::Null);
        assert_eq!(parse_output("{\"a\": 1}\n").unwrap()["a"], 1);
        assert!(parse_output("Usage: aws").is_err());
    }

    #[test]
    fn test_failed_with() {
        let err = Error::CommandExecutor(command_executor::Error::CommandFailed {
            command: "aws ec2 describe-instances".into(),
            code: Some(254),
            stderr: "An error occurred (InvalidInstanceID.NotFound)".into(),
        });
        assert!(failed_with(&err, &["InvalidInstanceID.NotFound"]));
        assert!(!failed_with(&err, &["ResourceNotFound"]));
        assert!(!failed_with(&Error::MissingInstance, &["x"]));
    }

    #[test]
    fn test_system_cli_runs_program() {
        let cli = SystemCli::new();
        let value = futures::executor::block_on(
            cli.run_json("sh", &args(&["-c", "echo '{\"ok\": true}'"])),
        )
        .unwrap();
        assert_eq!(value["ok"], true);

        let err = futures::executor::block_on(cli.run_json("sh", &args(&["-c", "echo nope >&2; exit 3"])))
            .unwrap_err();
        assert!(failed_with(&err, &["nope"]));
    }

    #[test]
    fn test_system_cli_disables_pager() {
        let cli = SystemCli::new();
        let script = "printf '{\"pager\": \"%s\", \"color\": \"%s\"}' \"${AWS_PAGER-unset}\" \"$AZURE_CORE_NO_COLOR\"";
        let value = futures::executor::block_on(cli.run_json("sh", &args(&["-c", script]))).unwrap();
        assert_eq!(value["pager"], "");
        assert_eq!(value["color"], "true");
    }
}
