//! Configuration management

use crate::orchestrator::OrchestratorConfig;
use crate::session::{Identity, StaticDirectory};
use crate::termination::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub session: SessionConfig,
    pub termination: TerminationConfig,
    pub directory: DirectoryConfig,
}

/// General settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Socket directory
    pub runtime_dir: Option<PathBuf>,

    /// Identity the CLI acts as when `--as` is not given
    pub identity: Option<String>,

    /// Display name shown to other participants
    pub display_name: Option<String>,
}

/// Per-session limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Events buffered per session before slow subscribers start lagging
    pub event_buffer: usize,

    /// Chat messages kept for replay to late joiners
    pub chat_history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            chat_history_limit: 1000,
        }
    }
}

/// Completion-commit retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 200,
            max_backoff_ms: 5000,
            multiplier: 2.0,
        }
    }
}

/// Static role directory used by the daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Identities that may schedule and host interviews
    pub interviewers: Vec<String>,

    /// Identities whose role lookup reports pending
    pub pending: Vec<String>,
}

impl Config {
    /// Load config from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("interview-room")
            .join("config.toml")
    }

    /// Get the runtime directory for sockets
    pub fn runtime_dir(&self) -> PathBuf {
        self.general
            .runtime_dir
            .clone()
            .or_else(dirs::runtime_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("interview-room")
    }

    /// Get socket path for a daemon instance
    pub fn socket_path(&self, name: &str) -> PathBuf {
        self.runtime_dir().join(format!("{}.sock", name))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.termination.max_attempts,
            initial_backoff: Duration::from_millis(self.termination.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.termination.max_backoff_ms),
            multiplier: self.termination.multiplier,
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            event_buffer: self.session.event_buffer,
            chat_history_limit: self.session.chat_history_limit,
            retry: self.retry_policy(),
        }
    }

    pub fn directory(&self) -> StaticDirectory {
        StaticDirectory::new(
            self.directory.interviewers.iter().map(Identity::new),
            self.directory.pending.iter().map(Identity::new),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [termination]
            max_attempts = 3

            [directory]
            interviewers = ["alice"]
            "#,
        )
        .unwrap();

        assert_eq!(config.termination.max_attempts, 3);
        assert_eq!(config.termination.initial_backoff_ms, 200);
        assert_eq!(config.session.chat_history_limit, 1000);
        assert_eq!(config.directory.interviewers, vec!["alice"]);
    }

    #[test]
    fn retry_policy_uses_milliseconds() {
        let mut config = Config::default();
        config.termination.initial_backoff_ms = 50;
        let policy = config.retry_policy();
        assert_eq!(policy.initial_backoff, Duration::from_millis(50));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn socket_lives_under_runtime_dir() {
        let mut config = Config::default();
        config.general.runtime_dir = Some(PathBuf::from("/tmp/rt"));
        assert_eq!(
            config.socket_path("default"),
            PathBuf::from("/tmp/rt/interview-room/default.sock")
        );
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.event_buffer, 256);
    }
}
