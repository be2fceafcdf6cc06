//! Application launching
//!
//! Resolves an application target against an explicit [`AppRegistry`],
//! serves it over HTTP, and supervises the serving task: graceful shutdown on
//! signal and, in development mode only, restart on source changes.

pub mod app;
pub mod registry;
pub mod server;
pub mod signal;
pub mod state;
pub mod supervisor;
pub mod target;
pub mod watcher;

pub use app::{AppFactory, Application, RouterApp};
pub use registry::AppRegistry;
pub use server::{start_server, RunningServer};
pub use signal::shutdown_signal;
pub use state::{wait_until_serving, ServerState};
pub use supervisor::Supervisor;
pub use target::AppTarget;
pub use watcher::SourceWatcher;

use crate::config::{BerthConfig, ConfigError};
use crate::environment::RuntimeEnv;
use crate::exit;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Invalid application target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Could not import module '{module}': no application registered under it")]
    ModuleNotFound { module: String },

    #[error("Attribute '{attribute}' not found in module '{module}'")]
    AttributeNotFound { module: String, attribute: String },

    #[error("Failed to construct application '{target}': {message}")]
    AppConstruction { target: String, message: String },

    #[error("Startup of '{target}' failed: {message}")]
    Startup { target: String, message: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] io::Error),

    #[error("Failed to watch sources: {0}")]
    Watch(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LaunchError {
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::InvalidTarget { .. }
            | LaunchError::ModuleNotFound { .. }
            | LaunchError::AttributeNotFound { .. }
            | LaunchError::AppConstruction { .. }
            | LaunchError::Startup { .. } => exit::APP_IMPORT,
            LaunchError::Bind { .. } => exit::BIND,
            LaunchError::Config(_) => exit::CONFIG,
            LaunchError::Serve(_) | LaunchError::Watch(_) => exit::FAILURE,
        }
    }
}

/// Serves the configured application until Ctrl+C or SIGTERM
pub async fn launch(config: &BerthConfig, registry: Arc<AppRegistry>) -> Result<(), LaunchError> {
    launch_until(config, registry, shutdown_signal()).await
}

/// Serves the configured application until `shutdown` resolves
pub async fn launch_until<F>(
    config: &BerthConfig,
    registry: Arc<AppRegistry>,
    shutdown: F,
) -> Result<(), LaunchError>
where
    F: Future<Output = ()> + Send,
{
    config.validate()?;
    let target = AppTarget::parse(&config.app_target)?;
    let addr = config.bind_addr()?;

    let missing = RuntimeEnv::missing();
    if !missing.is_empty() {
        warn!("Runtime environment flags not set: {}", missing.join(", "));
    }

    let watcher = if config.reload {
        warn!("Reload mode is enabled; do not use it in production");
        let watcher = SourceWatcher::new(&config.reload_dirs, &config.reload_extensions)
            .map_err(|e| LaunchError::Watch(e.to_string()))?;
        Some(watcher)
    } else {
        None
    };

    info!(
        "Launching {} on {} (reload: {})",
        target,
        addr,
        if config.reload { "on" } else { "off" }
    );

    let supervisor = Supervisor::new(registry, target, addr, config.shutdown_timeout());
    supervisor.run(shutdown, watcher).await
}
