//! Platform command executor.
//!
//! Runs one external command and returns its stdout, or a typed failure.
//! Everything above this module is expressed in terms of [`CommandRunner`].

use async_trait::async_trait;
use netfast_core::{FilterError, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Default time an external command may run
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(20);

/// One external command: program plus arguments, no shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments, passed verbatim
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build a command
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Something that can run platform commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command, returning stdout on success.
    ///
    /// Fails with `PermissionDenied` when the failure text looks like an
    /// elevation problem, `ExecutionFailed` otherwise.
    async fn run(&self, spec: &CommandSpec) -> Result<String>;
}

/// Runs commands on the host through `tokio::process`
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl SystemRunner {
    /// Runner with a per-command timeout
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<String> {
        debug!(command = %spec, "running command");

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(FilterError::ExecutionFailed(format!(
                    "`{spec}` timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FilterError::ExecutionFailed(format!(
                    "`{}` is not installed or not on PATH",
                    spec.program
                )))
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(FilterError::PermissionDenied(format!("`{spec}`: {e}")))
            }
            Ok(Err(e)) => return Err(FilterError::ExecutionFailed(format!("`{spec}`: {e}"))),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        // netsh reports its errors on stdout, so classify both streams
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(command = %spec, status = ?output.status.code(), "command failed");
        Err(FilterError::from_command_output(
            &spec.to_string(),
            &format!("{}\n{}", stderr.trim(), stdout.trim()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_spaces() {
        let spec = CommandSpec::new(
            "netsh",
            ["interface", "ipv4", "set", "dnsservers", "name=Wi-Fi 2", "source=dhcp"],
        );
        assert_eq!(
            spec.to_string(),
            "netsh interface ipv4 set dnsservers \"name=Wi-Fi 2\" source=dhcp"
        );
        let empty = CommandSpec::new("nmcli", ["ipv4.dns", ""]);
        assert_eq!(empty.to_string(), "nmcli ipv4.dns \"\"");
    }

    #[tokio::test]
    async fn test_missing_program_is_execution_failure() {
        let runner = SystemRunner::default();
        let err = runner
            .run(&CommandSpec::new("netfast-definitely-not-a-program", ["--version"]))
            .await
            .unwrap_err();
        assert!(matches!(err, FilterError::ExecutionFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_classified() {
        let runner = SystemRunner::default();
        let err = runner
            .run(&CommandSpec::new(
                "sh",
                ["-c", "echo 'Failed to set DNS: Access denied' >&2; exit 1"],
            ))
            .await
            .unwrap_err();
        assert!(err.is_permission_error());

        let out = runner
            .run(&CommandSpec::new("sh", ["-c", "echo nameserver 1.1.1.3"]))
            .await
            .unwrap();
        assert_eq!(out.trim(), "nameserver 1.1.1.3");
    }
}
