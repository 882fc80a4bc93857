// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Local daemon control: configuration writes, shell commands and sysctls.

use crate::errors::LocalDaemonError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::process::Command;
use tracing::{debug, error, info};

/// Primitives the keepalived backend drives the local daemon with.
#[async_trait]
pub trait DaemonControl: Send + Sync {
    /// Replace the daemon configuration file.
    async fn write_config(&self, path: &Path, contents: &str) -> Result<(), LocalDaemonError>;

    /// Run a shell command to completion.
    async fn run(&self, command: &str) -> Result<(), LocalDaemonError>;

    /// Set a kernel parameter, `key` relative to `/proc/sys`.
    async fn set_sysctl(&self, key: &str, value: &str) -> Result<(), LocalDaemonError>;
}

/// [`DaemonControl`] over the local filesystem and `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellDaemonControl {
    sysctl_root: PathBuf,
}

impl Default for ShellDaemonControl {
    fn default() -> Self {
        Self {
            sysctl_root: PathBuf::from("/proc/sys"),
        }
    }
}

impl ShellDaemonControl {
    /// Create a controller writing sysctls under `/proc/sys`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller writing sysctls under another root.
    #[must_use]
    pub fn with_sysctl_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysctl_root: root.into(),
        }
    }
}

#[async_trait]
impl DaemonControl for ShellDaemonControl {
    async fn write_config(&self, path: &Path, contents: &str) -> Result<(), LocalDaemonError> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| LocalDaemonError::ConfigWrite {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(path = %path.display(), bytes = contents.len(), "Wrote keepalived configuration");
        Ok(())
    }

    async fn run(&self, command: &str) -> Result<(), LocalDaemonError> {
        info!(command = %command, "Executing command");

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| LocalDaemonError::CommandFailed {
                command: command.to_string(),
                reason: format!("failed to start: {e}"),
            })?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                command = %command,
                status = %output.status,
                stdout = %stdout,
                stderr = %stderr,
                "Command finished with error"
            );
            return Err(LocalDaemonError::CommandFailed {
                command: command.to_string(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }

    async fn set_sysctl(&self, key: &str, value: &str) -> Result<(), LocalDaemonError> {
        let path = self.sysctl_root.join(key);
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| LocalDaemonError::ConfigWrite {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

/// [`DaemonControl`] that records calls instead of touching the system.
#[derive(Debug, Default)]
pub struct RecordingDaemonControl {
    state: Mutex<Recorded>,
}

#[derive(Debug, Default)]
struct Recorded {
    configs: Vec<String>,
    commands: Vec<String>,
    sysctls: Vec<(String, String)>,
    fail_writes: bool,
    fail_commands: bool,
}

impl RecordingDaemonControl {
    /// Create a recorder that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make configuration writes fail.
    pub fn fail_writes(&self, enabled: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_writes = enabled;
    }

    /// Make commands fail.
    pub fn fail_commands(&self, enabled: bool) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_commands = enabled;
    }

    /// Every configuration written, oldest first.
    #[must_use]
    pub fn configs(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .configs
            .clone()
    }

    /// Every command run, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .clone()
    }

    /// Every sysctl set, oldest first.
    #[must_use]
    pub fn sysctls(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sysctls
            .clone()
    }
}

#[async_trait]
impl DaemonControl for RecordingDaemonControl {
    async fn write_config(&self, path: &Path, contents: &str) -> Result<(), LocalDaemonError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fail_writes {
            return Err(LocalDaemonError::ConfigWrite {
                path: path.display().to_string(),
                reason: "write refused".to_string(),
            });
        }
        state.configs.push(contents.to_string());
        Ok(())
    }

    async fn run(&self, command: &str) -> Result<(), LocalDaemonError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.commands.push(command.to_string());
        if state.fail_commands {
            return Err(LocalDaemonError::CommandFailed {
                command: command.to_string(),
                reason: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }

    async fn set_sysctl(&self, key: &str, value: &str) -> Result<(), LocalDaemonError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sysctls
            .push((key.to_string(), value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod daemon_tests;
