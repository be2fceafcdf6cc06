//! Structured logging setup for berth
//!
//! This module provides initialization and configuration for structured logging using
//! the `tracing` ecosystem. It supports various output formats, filtering, and
//! runtime configuration via environment variables.
//!
//! # Features
//!
//! - Console output with pretty formatting (default)
//! - Optional JSON output for production environments
//! - Optional log file instead of stderr
//! - Environment-based configuration via `RUST_LOG`
//! - Thread-safe, can only be initialized once
//!
//! Logs always go to stderr (or the log file) so that commands printing a
//! Dockerfile or plan on stdout can be piped safely.
//!
//! # Example
//!
//! ```no_run
//! use berth::util::logging;
//!
//! // Initialize from BERTH_LOG_LEVEL / BERTH_LOG_JSON / BERTH_LOG_FILE
//! logging::init_from_env();
//!
//! use tracing::{info, debug};
//!
//! info!("Launcher started");
//! debug!(target_app = "main:app", "Resolving application");
//! ```

use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

pub const LOG_LEVEL_VAR: &str = "BERTH_LOG_LEVEL";
pub const LOG_JSON_VAR: &str = "BERTH_LOG_JSON";
pub const LOG_FILE_VAR: &str = "BERTH_LOG_FILE";

/// Dependencies that are noisy at info level
const QUIET_DEPENDENCIES: &[&str] = &["h2=warn", "hyper=warn", "hyper_util=warn", "notify=warn"];

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level for berth's own events
    pub level: Level,

    /// Use JSON output format (for structured logging in production)
    pub use_json: bool,

    /// Include the module target (e.g., berth::launch) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    /// Include thread ID and name in logs
    pub include_thread_ids: bool,

    /// Append to this file instead of writing to stderr
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    /// INFO level, pretty console output on stderr, module targets shown
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
            log_file: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with location and thread metadata, for container logs
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: true,
            log_file: None,
        }
    }

    /// Debug level console output for working on an application locally
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }

    /// Builds a configuration from `BERTH_LOG_LEVEL`, `BERTH_LOG_JSON` and
    /// `BERTH_LOG_FILE`, falling back to defaults for unset variables
    pub fn from_env() -> Self {
        let level = env::var(LOG_LEVEL_VAR)
            .map(|v| parse_level(&v))
            .unwrap_or(Level::INFO);

        let use_json = env::var(LOG_JSON_VAR)
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(false);

        let log_file = env::var(LOG_FILE_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Self {
            level,
            use_json,
            log_file,
            ..Default::default()
        }
    }
}

/// Parses a log level from a string, case-insensitively.
///
/// Unknown values fall back to `Level::INFO` with a note on stderr.
///
/// ```
/// use berth::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("INFO"), Level::INFO);
/// assert_eq!(parse_level("invalid"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn build_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("berth={}", level).parse() {
        filter = filter.add_directive(directive);
    }
    if let Ok(directive) = format!("tower_http={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    // RUST_LOG takes over dependency filtering when it is set
    if env::var("RUST_LOG").is_err() {
        for spec in QUIET_DEPENDENCIES {
            if let Ok(directive) = spec.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

fn build_writer(config: &LoggingConfig) -> BoxMakeWriter {
    let Some(path) = &config.log_file else {
        return BoxMakeWriter::new(io::stderr);
    };

    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(e) => {
            eprintln!(
                "Cannot open log file {}: {}; logging to stderr",
                path.display(),
                e
            );
            BoxMakeWriter::new(io::stderr)
        }
    }
}

/// Initializes the logging system. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(config.level);
        let writer = build_writer(&config);
        let ansi = config.log_file.is_none();

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(ansi)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from `BERTH_LOG_*` variables and `RUST_LOG`
pub fn init_from_env() {
    init_logging(LoggingConfig::from_env());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        keys: Vec<&'static str>,
    }

    impl EnvGuard {
        fn new(keys: &[&'static str]) -> Self {
            for key in keys {
                env::remove_var(key);
            }
            Self {
                keys: keys.to_vec(),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in &self.keys {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_presets() {
        let production = LoggingConfig::production();
        assert!(production.use_json);
        assert!(production.include_location);

        let development = LoggingConfig::development();
        assert_eq!(development.level, Level::DEBUG);
        assert!(!development.use_json);
        assert!(development.log_file.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        let _guard = EnvGuard::new(&[LOG_LEVEL_VAR, LOG_JSON_VAR, LOG_FILE_VAR]);
        let config = LoggingConfig::from_env();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(config.log_file.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        let _guard = EnvGuard::new(&[LOG_LEVEL_VAR, LOG_JSON_VAR, LOG_FILE_VAR]);
        env::set_var(LOG_LEVEL_VAR, "warn");
        env::set_var(LOG_JSON_VAR, "true");
        env::set_var(LOG_FILE_VAR, "/tmp/berth.log");

        let config = LoggingConfig::from_env();
        assert_eq!(config.level, Level::WARN);
        assert!(config.use_json);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/berth.log")));
    }

    #[test]
    fn test_unwritable_log_file_falls_back() {
        let config = LoggingConfig {
            log_file: Some(PathBuf::from("/nonexistent-dir/berth.log")),
            ..Default::default()
        };
        // must not panic
        let _writer = build_writer(&config);
    }
}
