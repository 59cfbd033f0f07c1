//! TrustChain configuration file handling
//!
//! Provides default configuration generation and loading for the service.
//! Configuration files are TOML format and live under the user data
//! directory unless a path is given.
//!
//! Seed members and quotas are read once at bootstrap. Once a store holds
//! state, the stored members win: editing `[network]` afterwards does not
//! rewrite an existing trust graph.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use trustchain::network::{NetworkConfig, PollConfig};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default API listen address
const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrustChainConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Trust model parameters and seed members
    #[serde(default)]
    pub network: NetworkConfig,

    /// The active poll
    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for the HTTP API
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Token for the operator routes (suspend, reinstate, close poll).
    /// Those routes are disabled while unset.
    #[serde(default)]
    pub operator_token: Option<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite database path (state is kept in memory only if not specified)
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            operator_token: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl TrustChainConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: TrustChainConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(storage_path: &Path) -> String {
        format!(
            r#"# TrustChain Configuration
#
# [network] and [poll] are read when the trust graph is first created.
# After that the stored state is authoritative.

[server]
# Listen address for the HTTP API
bind = "{bind}"

# Shared secret sent as `x-operator-token` to suspend or reinstate members
# and to close the poll. Operator routes stay disabled while unset.
# operator_token = "change-me"

[network]
# Invite quota for seed members (their bootstrap batch size)
seed_quota = 5

# Invite quota for members admitted by invite
standard_quota = 3

[[network.seeds]]
id = "seed-1"
name = "Dr. Ahmed (physician)"
# Fixed codes count toward the seed's batch; the rest are generated
codes = ["SEED-A1", "SEED-A2"]

[[network.seeds]]
id = "seed-2"
name = "Eng. Sara"
codes = ["SEED-B1"]

[poll]
title = "Active ballot: Local Council"

[[poll.candidates]]
id = 1
name = "Omar Al-Mukhtar"
occupation = "Civic activist"
endorsements = 120
manifesto = "Improve infrastructure and education."

[[poll.candidates]]
id = 2
name = "Layla Khaled"
occupation = "Lawyer"
endorsements = 105
manifesto = "Social justice and support for small businesses."

[storage]
# SQLite database (comment out to keep state in memory only)
path = "{storage_path}"

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set
level = "info"
"#,
            bind = DEFAULT_BIND,
            storage_path = storage_path.display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        storage_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(storage_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Base data directory: `<data_dir>/trustchain`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trustchain")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Get the default database path, adjacent to the config file
pub fn default_storage_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or(config_path)
        .join("trustchain.db")
}
