//! Server configuration
//!
//! Loads `workflow-server.toml` and applies `WORKFLOW_*` environment
//! overrides on top of it.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! name = "workflow-server"
//!
//! [engine]
//! max_iterations = 100
//! routing = "lenient"
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use workflow_core::{EngineConfig, RoutingMode, DEFAULT_MAX_ITERATIONS};

pub const CONFIG_ENV: &str = "WORKFLOW_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/workflow-server.toml";

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid environment variable {key}: {error}")]
    InvalidEnv { key: String, error: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Listener and identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: default_server_name(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_server_name() -> String {
    "workflow-server".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default)]
    pub routing: RoutingMode,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            routing: RoutingMode::default(),
        }
    }
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Complete server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServerConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ServerConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ServerConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve, load, override from the environment and validate.
    ///
    /// Search order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. `WORKFLOW_CONFIG` environment variable
    /// 3. `./config/workflow-server.toml`
    ///
    /// When none of these exist the defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ServerConfigError> {
        let mut config = match Self::locate(explicit) {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Self::from_file(path)?
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ServerConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `WORKFLOW_HOST`, `WORKFLOW_PORT`, `WORKFLOW_MAX_ITERATIONS` and
    /// `WORKFLOW_ROUTING` as returned by `lookup`
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ServerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("WORKFLOW_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_override(&lookup, "WORKFLOW_PORT")? {
            self.server.port = port;
        }
        if let Some(max) = parse_override(&lookup, "WORKFLOW_MAX_ITERATIONS")? {
            self.engine.max_iterations = max;
        }
        if let Some(routing) = parse_override(&lookup, "WORKFLOW_ROUTING")? {
            self.engine.routing = routing;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.server.port == 0 {
            return Err(ServerConfigError::InvalidConfig(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }
        if self.engine.max_iterations == 0 {
            return Err(ServerConfigError::InvalidConfig(
                "engine.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(ServerConfigError::InvalidConfig(
                "server.host must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ServerConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ServerConfigError::InvalidConfig(format!("Invalid listen address: {}", e)))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_max_iterations(self.engine.max_iterations)
            .with_routing(self.engine.routing)
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ServerConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ServerConfigError::InvalidEnv {
                key: key.to_string(),
                error: e.to_string(),
            }),
        None => Ok(None),
    }
}
