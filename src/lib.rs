//! berth - container image planning and application launching for ASGI web services
//!
//! berth covers the two halves of running a Poetry-managed web service in a
//! container: building the image and starting the server inside it.
//!
//! # Core Concepts
//!
//! - **Image plan**: an ordered, role-tagged list of build instructions. The
//!   dependency manager is pinned, dependencies are installed from the lock
//!   into the global environment, and the source tree is copied last so that
//!   source-only changes reuse the dependency layers
//! - **Application target**: `module.path:attr`, resolved against an explicit
//!   registry instead of by reflection
//! - **Supervisor**: owns the serving task, shuts it down gracefully on
//!   signal, and in development mode restarts it on source changes
//!
//! # Example Usage
//!
//! ```no_run
//! use berth::builtin::default_registry;
//! use berth::{launch, BerthConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BerthConfig::from_env()?;
//! let registry = Arc::new(default_registry()?);
//! launch::launch(&config, registry).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`manifest`]: pyproject/lock parsing and installed-set verification
//! - [`image`]: image plan construction, layer cache keys, Dockerfile rendering
//! - [`launch`]: target resolution, serving, supervision and reload
//! - [`environment`]: process-wide runtime flags shared by image and launcher

pub mod builtin;
pub mod cli;
pub mod config;
pub mod environment;
pub mod exit;
pub mod image;
pub mod launch;
pub mod manifest;
pub mod util;

// Re-export key types for convenient access
pub use config::{BerthConfig, ConfigError, ConfigOverrides};
pub use environment::RuntimeEnv;
pub use image::{render_dockerfile, ImagePlan, PlanError, PlanOptions, PoetryManager, ProjectSources};
pub use launch::{AppRegistry, AppTarget, Application, LaunchError, ServerState, Supervisor};
pub use manifest::{verify_installed, DriftReport, InstalledSet, LockFile, Manifest, ManifestError};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_berth() {
        assert_eq!(NAME, "berth");
    }
}
