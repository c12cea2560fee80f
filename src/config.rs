use crate::credentials::DEFAULT_ACCOUNTS_PATH;
use crate::protocol::DEFAULT_BUFFER_SIZE;
use crate::registry::{DEFAULT_MAX_CAPACITY, DEFAULT_MIN_CAPACITY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the credential store path.
pub const ACCOUNTS_ENV: &str = "TERMD_ACCOUNTS";

/// Smallest I/O buffer that still fits a status line, a header and a short message.
pub const MIN_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog for the stream transport.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Directory every session starts in; clients see it as `/`.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Credential store file.
    #[serde(default = "default_accounts")]
    pub accounts: PathBuf,
    /// Per-session I/O buffer: request line bound and response chunk size.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub datagram: DatagramConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_min_capacity")]
    pub min_capacity: usize,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,
}

/// Liveness settings for the datagram transport.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatagramConfig {
    /// Heartbeat and expiry sweep period. Default: 5
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// A peer silent for this long is dropped. Default: 8
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogConfig {
    /// Filter directive used when `TERMD_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append log lines to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            root: default_root(),
            accounts: default_accounts(),
            buffer_size: default_buffer_size(),
            registry: RegistryConfig::default(),
            datagram: DatagramConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_capacity: default_min_capacity(),
            max_capacity: default_max_capacity(),
        }
    }
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_backlog() -> u32 {
    5
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_accounts() -> PathBuf {
    PathBuf::from(DEFAULT_ACCOUNTS_PATH)
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_min_capacity() -> usize {
    DEFAULT_MIN_CAPACITY
}

fn default_max_capacity() -> usize {
    DEFAULT_MAX_CAPACITY
}

fn default_heartbeat_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `<config dir>/termd/config.yaml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("termd").join("config.yaml"))
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given, else the default config file if it exists,
    /// else the built-in defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Applies environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(ACCOUNTS_ENV) {
            if !path.is_empty() {
                self.accounts = PathBuf::from(path);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.min_capacity == 0 {
            anyhow::bail!("registry.min_capacity must be at least 1");
        }
        if self.registry.min_capacity > self.registry.max_capacity {
            anyhow::bail!(
                "registry.min_capacity ({}) exceeds registry.max_capacity ({})",
                self.registry.min_capacity,
                self.registry.max_capacity
            );
        }
        if self.buffer_size < MIN_BUFFER_SIZE {
            anyhow::bail!(
                "buffer_size must be at least {} bytes, got {}",
                MIN_BUFFER_SIZE,
                self.buffer_size
            );
        }
        if self.datagram.heartbeat_secs == 0 {
            anyhow::bail!("datagram.heartbeat_secs must be greater than zero");
        }
        if self.datagram.timeout_secs == 0 {
            anyhow::bail!("datagram.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.datagram.heartbeat_secs)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.datagram.timeout_secs)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
