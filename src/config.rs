//! Configuration for the orchestrator daemon.
//!
//! Loaded from a TOML file (default `/etc/wowza-orchestrator/config.toml`),
//! then overridden by `WOWZA_ORCH_*` environment variables.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ServerRecord;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/wowza-orchestrator/config.toml";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("connect_timeout_secs must be between 1 and command_timeout_secs ({command}), got {connect}")]
    InvalidConnectTimeout { connect: u64, command: u64 },

    #[error("command_timeout_secs must be greater than 0")]
    InvalidCommandTimeout,

    #[error("{field} must be an absolute path, got {value}")]
    RelativePath { field: &'static str, value: String },

    #[error("mode must be an octal permission like 755, got {0}")]
    InvalidMode(String),

    #[error("restart delays must satisfy 0 < initial_delay_ms <= max_delay_ms <= max_wait_ms")]
    InvalidRestartBackoff,

    #[error("service_unit, owner and group must be non-empty")]
    MissingServiceIdentity,

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub ssh: SshConfig,
    pub layout: LayoutConfig,
    pub restart: RestartConfig,

    /// Servers known before the back office pushes its inventory.
    pub servers: Vec<ServerRecord>,

    /// Account names known before the back office pushes its inventory.
    pub accounts: AccountSeed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address of the control API.
    pub listen_addr: SocketAddr,

    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SshConfig {
    /// Remote login used for every server.
    pub user: String,

    /// `sshpass` binary, looked up on `PATH` when relative.
    pub sshpass: PathBuf,

    pub connect_timeout_secs: u64,

    /// Upper bound for one remote command, connection included.
    pub command_timeout_secs: u64,
}

/// Where Wowza lives on the media servers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Wowza `conf` directory; one application directory per account.
    pub config_root: String,

    /// Per-account content storage.
    pub storage_root: String,

    /// Wowza installation directory (holds `bin/startup.sh`).
    pub install_dir: String,

    pub service_unit: String,
    pub owner: String,
    pub group: String,
    pub mode: String,

    /// Entries of `config_root` that are never treated as accounts.
    pub infrastructure_files: Vec<String>,
}

/// Backoff for the post-restart `is-active` poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestartConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AccountSeed {
    pub reseller_usernames: Vec<String>,
    pub streaming_logins: Vec<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            sshpass: PathBuf::from("sshpass"),
            connect_timeout_secs: 30,
            command_timeout_secs: 60,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            config_root: "/usr/local/WowzaStreamingEngine-4.8.0/conf".to_string(),
            storage_root: "/home/streaming".to_string(),
            install_dir: "/usr/local/WowzaStreamingEngine-4.8.0".to_string(),
            service_unit: "WowzaStreamingEngine".to_string(),
            owner: "wowza".to_string(),
            group: "wowza".to_string(),
            mode: "755".to_string(),
            infrastructure_files: vec!["VHost.xml".to_string(), "Server.xml".to_string()],
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            max_delay_ms: 8_000,
            max_wait_ms: 60_000,
        }
    }
}

impl RestartConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl LayoutConfig {
    pub fn startup_script(&self) -> String {
        format!("{}/bin/startup.sh", self.install_dir.trim_end_matches('/'))
    }
}

impl Config {
    /// Environment variables take precedence over the config file:
    /// - WOWZA_ORCH_LISTEN_ADDR
    /// - WOWZA_ORCH_LOG_LEVEL
    /// - WOWZA_ORCH_SSH_USER
    /// - WOWZA_ORCH_CONFIG_ROOT
    ///
    /// Returns the `(setting, value)` pairs that were overridden. Nothing is
    /// logged here since this runs before the subscriber exists.
    pub fn apply_env_overrides(&mut self) -> Result<Vec<(&'static str, String)>> {
        let mut applied = Vec::new();
        if let Some(addr) = env_value("WOWZA_ORCH_LISTEN_ADDR") {
            self.daemon.listen_addr = addr
                .parse()
                .with_context(|| format!("parse WOWZA_ORCH_LISTEN_ADDR: {addr}"))?;
            applied.push(("listen_addr", addr));
        }
        if let Some(level) = env_value("WOWZA_ORCH_LOG_LEVEL") {
            self.daemon.log_level = level.clone();
            applied.push(("log_level", level));
        }
        if let Some(user) = env_value("WOWZA_ORCH_SSH_USER") {
            self.ssh.user = user.clone();
            applied.push(("ssh user", user));
        }
        if let Some(root) = env_value("WOWZA_ORCH_CONFIG_ROOT") {
            self.layout.config_root = root.clone();
            applied.push(("config_root", root));
        }
        Ok(applied)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh.command_timeout_secs == 0 {
            return Err(ConfigError::InvalidCommandTimeout);
        }
        if self.ssh.connect_timeout_secs == 0
            || self.ssh.connect_timeout_secs > self.ssh.command_timeout_secs
        {
            return Err(ConfigError::InvalidConnectTimeout {
                connect: self.ssh.connect_timeout_secs,
                command: self.ssh.command_timeout_secs,
            });
        }

        for (field, value) in [
            ("config_root", &self.layout.config_root),
            ("storage_root", &self.layout.storage_root),
            ("install_dir", &self.layout.install_dir),
        ] {
            if !value.starts_with('/') || value.trim_end_matches('/').is_empty() {
                return Err(ConfigError::RelativePath {
                    field,
                    value: value.clone(),
                });
            }
        }

        let mode = &self.layout.mode;
        if !(3..=4).contains(&mode.len()) || !mode.chars().all(|c| ('0'..='7').contains(&c)) {
            return Err(ConfigError::InvalidMode(mode.clone()));
        }

        if self.layout.service_unit.trim().is_empty()
            || self.layout.owner.trim().is_empty()
            || self.layout.group.trim().is_empty()
        {
            return Err(ConfigError::MissingServiceIdentity);
        }

        let r = &self.restart;
        if r.initial_delay_ms == 0 || r.initial_delay_ms > r.max_delay_ms || r.max_delay_ms > r.max_wait_ms {
            return Err(ConfigError::InvalidRestartBackoff);
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Loads the file at `path`; a missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
