//! Configuration management for berth
//!
//! Launcher settings are loaded from environment variables with defaults, and
//! command-line flags override them.
//!
//! # Environment Variables
//!
//! - `BERTH_APP`: Application target (`module.path:attr`) - default: "berth.builtin:health"
//! - `BERTH_HOST`: Interface to bind - default: "0.0.0.0" (all interfaces)
//! - `BERTH_PORT`: Port to bind - default: "8000"
//! - `BERTH_RELOAD`: Development reload mode (true|false) - default: "false"
//! - `BERTH_RELOAD_DIRS`: Comma-separated directories to watch - default: "."
//! - `BERTH_RELOAD_EXTS`: Comma-separated file extensions that trigger reload - default: "rs,toml,py,html"
//! - `BERTH_SHUTDOWN_TIMEOUT`: Graceful shutdown timeout in seconds - default: "30"
//! - `BERTH_LOG_LEVEL`: Logging level - default: "info"
//!
//! The interpreter flags (`PYTHONUNBUFFERED`, `PYTHONDONTWRITEBYTECODE`) are
//! handled separately by [`crate::environment::RuntimeEnv`].
//!
//! # Example
//!
//! ```no_run
//! use berth::BerthConfig;
//!
//! let config = BerthConfig::from_env().expect("valid environment");
//! config.validate().expect("Invalid configuration");
//! println!("binding {}", config.bind_addr().unwrap());
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_APP_TARGET: &str = "berth.builtin:health";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_RELOAD_EXTENSIONS: &[&str] = &["rs", "toml", "py", "html"];
const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid host '{0}': expected an IP address or 'localhost'")]
    InvalidHost(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Launcher configuration
#[derive(Debug, Clone)]
pub struct BerthConfig {
    /// Application target, `module.path:attr`
    pub app_target: String,

    pub host: String,

    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,

    /// Development reload mode. Never enabled by default.
    pub reload: bool,

    pub reload_dirs: Vec<PathBuf>,

    pub reload_extensions: Vec<String>,

    pub shutdown_timeout_secs: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for BerthConfig {
    /// Built-in defaults, without looking at the environment
    fn default() -> Self {
        Self {
            app_target: DEFAULT_APP_TARGET.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            reload: false,
            reload_dirs: vec![PathBuf::from(".")],
            reload_extensions: DEFAULT_RELOAD_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Command-line values that take precedence over the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub app_target: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// `Some(false)` turns reload off even when `BERTH_RELOAD` enables it
    pub reload: Option<bool>,
    pub reload_dirs: Vec<PathBuf>,
    pub reload_extensions: Vec<String>,
    pub shutdown_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::ParseError {
            field: field.to_string(),
            error: format!("'{}' is not a boolean", other),
        }),
    }
}

impl BerthConfig {
    /// Loads `BERTH_*` variables on top of the defaults.
    ///
    /// Unlike a missing variable, a malformed one is an error: a typo in
    /// `BERTH_PORT` must not silently bind the default port.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(app) = env::var("BERTH_APP") {
            config.app_target = app;
        }
        if let Ok(host) = env::var("BERTH_HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("BERTH_PORT") {
            config.port = port.trim().parse::<u16>().map_err(|e| ConfigError::ParseError {
                field: "BERTH_PORT".to_string(),
                error: e.to_string(),
            })?;
        }
        if let Ok(reload) = env::var("BERTH_RELOAD") {
            config.reload = parse_bool("BERTH_RELOAD", &reload)?;
        }
        if let Ok(dirs) = env::var("BERTH_RELOAD_DIRS") {
            let dirs = split_list(&dirs);
            if !dirs.is_empty() {
                config.reload_dirs = dirs.into_iter().map(PathBuf::from).collect();
            }
        }
        if let Ok(exts) = env::var("BERTH_RELOAD_EXTS") {
            let exts = split_list(&exts);
            if !exts.is_empty() {
                config.reload_extensions = exts;
            }
        }
        if let Ok(timeout) = env::var("BERTH_SHUTDOWN_TIMEOUT") {
            config.shutdown_timeout_secs =
                timeout.trim().parse::<u64>().map_err(|e| ConfigError::ParseError {
                    field: "BERTH_SHUTDOWN_TIMEOUT".to_string(),
                    error: e.to_string(),
                })?;
        }
        if let Ok(level) = env::var("BERTH_LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }

        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(app) = overrides.app_target {
            self.app_target = app;
        }
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(reload) = overrides.reload {
            self.reload = reload;
        }
        if !overrides.reload_dirs.is_empty() {
            self.reload_dirs = overrides.reload_dirs;
        }
        if !overrides.reload_extensions.is_empty() {
            self.reload_extensions = overrides.reload_extensions;
        }
        if let Some(timeout) = overrides.shutdown_timeout_secs {
            self.shutdown_timeout_secs = timeout;
        }
        if let Some(level) = overrides.log_level {
            self.log_level = level.to_lowercase();
        }
    }

    /// Validates the configuration
    ///
    /// Checks that:
    /// - the host is an IP address (or `localhost`)
    /// - the shutdown timeout is between 1 second and 10 minutes
    /// - the log level is valid
    /// - with reload on, every watched directory exists
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Shutdown timeout must be at least 1 second".to_string(),
            ));
        }
        if self.shutdown_timeout_secs > MAX_SHUTDOWN_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Shutdown timeout cannot exceed 10 minutes".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        if self.reload {
            if self.reload_dirs.is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "Reload mode needs at least one directory to watch".to_string(),
                ));
            }
            if let Some(missing) = self.reload_dirs.iter().find(|d| !d.is_dir()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "Reload directory does not exist: {}",
                    missing.display()
                )));
            }
        }

        Ok(())
    }

    /// Socket address to bind
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = self.host.trim();
        let ip = if host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            host.trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?
        };
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Converts configuration to a display map for output formatting
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("app".to_string(), self.app_target.clone());
        map.insert("host".to_string(), self.host.clone());
        map.insert("port".to_string(), self.port.to_string());
        map.insert("reload".to_string(), self.reload.to_string());
        map.insert(
            "reload_dirs".to_string(),
            self.reload_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
        map.insert("reload_extensions".to_string(), self.reload_extensions.join(","));
        map.insert(
            "shutdown_timeout_secs".to_string(),
            self.shutdown_timeout_secs.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());
        map
    }
}

impl fmt::Display for BerthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Berth Configuration:")?;
        writeln!(f, "  App:              {}", self.app_target)?;
        writeln!(f, "  Bind:             {}:{}", self.host, self.port)?;
        writeln!(f, "  Reload:           {}", self.reload)?;
        if self.reload {
            writeln!(
                f,
                "  Watching:         {}",
                self.reload_dirs
                    .iter()
                    .map(|d| d.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
        }
        writeln!(f, "  Shutdown timeout: {}s", self.shutdown_timeout_secs)?;
        write!(f, "  Log level:        {}", self.log_level)
    }
}
