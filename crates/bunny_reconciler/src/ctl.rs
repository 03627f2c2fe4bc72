//! Low-level rabbitmqctl invocation.
//!
//! Commands are built as argument vectors, never as shell strings, and every
//! invocation runs with an explicit HOME override so the erlang cookie
//! resolves to the broker data directory regardless of the calling user.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Default rabbitmqctl binary location
pub const DEFAULT_CTL_BIN: &str = "/usr/sbin/rabbitmqctl";

/// Default HOME override when the environment provides none
pub const DEFAULT_HOME: &str = "/var/lib/rabbitmq";

/// Default systemd unit of the broker
pub const DEFAULT_SERVICE: &str = "rabbitmq-server";

/// Default per-command timeout
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Failed to parse output of `{command}`: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Captured result of a finished control-plane command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Configuration of the control client.
///
/// The HOME override is a constructor parameter rather than ambient process
/// state; `from_env` resolves the `$HOME` fallback exactly once.
#[derive(Debug, Clone)]
pub struct CtlConfig {
    /// Path to the rabbitmqctl binary
    pub bin: PathBuf,
    /// HOME override passed to every invocation
    pub home: PathBuf,
    /// Service unit restarted by the reset action
    pub service: String,
    /// Upper bound for a single command
    pub command_timeout: Duration,
}

impl CtlConfig {
    /// Builds a config with defaults, resolving HOME from the environment
    /// with the broker data directory as fallback.
    pub fn from_env() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME));
        Self {
            bin: PathBuf::from(DEFAULT_CTL_BIN),
            home,
            service: DEFAULT_SERVICE.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// Blocking-per-command rabbitmqctl client.
pub struct Rabbitmqctl {
    config: CtlConfig,
}

impl Rabbitmqctl {
    pub fn new(config: CtlConfig) -> Self {
        Self { config }
    }

    /// Runs rabbitmqctl with the given argument vector and captures the
    /// output without judging the exit status.
    pub async fn run(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let program = self.config.bin.to_string_lossy().to_string();
        self.run_program(&program, args).await
    }

    /// Runs rabbitmqctl and fails with `CommandError::Failed` on a non-zero
    /// exit status.
    pub async fn execute(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let output = self.run(args).await?;
        if !output.success() {
            return Err(CommandError::Failed {
                command: self.display_command(args),
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Runs rabbitmqctl and parses stdout as JSON.
    pub async fn execute_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, CommandError> {
        let output = self.execute(args).await?;
        serde_json::from_str(&output.stdout).map_err(|source| CommandError::Parse {
            command: self.display_command(args),
            source,
        })
    }

    /// Restarts the broker service unit via systemctl.
    pub async fn restart_service(&self) -> Result<(), CommandError> {
        let args = ["restart", self.config.service.as_str()];
        let output = self.run_program("systemctl", &args).await?;
        if !output.success() {
            return Err(CommandError::Failed {
                command: format!("systemctl restart {}", self.config.service),
                code: output.code,
                stderr: output.stderr,
            });
        }
        Ok(())
    }

    async fn run_program(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let command_line = format!("{} {}", program, args.join(" "));
        debug!(command = %command_line, "executing control-plane command");

        // kill_on_drop: a timed-out command must not keep running while a
        // retry issues the next invocation against the same broker
        let child = Command::new(program)
            .args(args)
            .env("HOME", &self.config.home)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.config.command_timeout, child).await {
            Ok(result) => result.map_err(|source| CommandError::Spawn {
                command: command_line.clone(),
                source,
            })?,
            Err(_) => {
                return Err(CommandError::Timeout {
                    command: command_line,
                    timeout: self.config.command_timeout,
                })
            }
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code(),
        };
        debug!(command = %command_line, code = ?result.code, "command finished");
        Ok(result)
    }

    fn display_command(&self, args: &[&str]) -> String {
        format!("{} {}", self.config.bin.display(), args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CtlConfig::from_env();

        assert_eq!(config.bin, PathBuf::from(DEFAULT_CTL_BIN));
        assert_eq!(config.service, DEFAULT_SERVICE);
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn test_command_output_success() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            code: Some(0),
        };
        assert!(output.success());

        let output = CommandOutput { code: Some(2), ..output };
        assert!(!output.success());

        let output = CommandOutput { code: None, ..output };
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_child_process() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let config = CtlConfig {
            bin: PathBuf::from("/bin/sh"),
            home: dir.path().to_path_buf(),
            service: DEFAULT_SERVICE.to_string(),
            command_timeout: Duration::from_millis(100),
        };
        let ctl = Rabbitmqctl::new(config);

        let script = format!("sleep 1; touch {}", marker.display());
        let result = ctl.execute(&["-c", &script]).await;
        assert!(matches!(result, Err(CommandError::Timeout { .. })));

        // The child must be gone with the timeout, not finish its work later
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_spawn_error_for_missing_binary() {
        let config = CtlConfig {
            bin: PathBuf::from("/nonexistent/rabbitmqctl"),
            home: PathBuf::from("/tmp"),
            service: DEFAULT_SERVICE.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        };
        let ctl = Rabbitmqctl::new(config);

        let result = ctl.execute(&["status"]).await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
