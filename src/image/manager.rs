//! Dependency manager definitions
//!
//! A dependency manager knows which files describe the dependency set, how to
//! install itself at a pinned version, how to install dependencies straight
//! into the image's global environment, and how the ASGI server is launched
//! once everything is in place.

use crate::manifest::{LOCK_FILE, MANIFEST_FILE};

pub const DEFAULT_POETRY_VERSION: &str = "1.8.3";

pub trait DependencyManager: Send + Sync {
    fn name(&self) -> &str;

    /// Pinned manager version
    fn version(&self) -> &str;

    /// Manifest and lock, copied before the install step
    fn manifest_files(&self) -> Vec<String>;

    fn install_manager_command(&self) -> String;

    /// Configuration applied after installation (e.g. disabling isolated environments)
    fn configure_commands(&self) -> Vec<String>;

    /// Installs the declared dependencies without the project's own package
    fn install_dependencies_command(&self) -> String;

    /// Packages present in the environment that the lock does not account for
    fn baseline_packages(&self) -> Vec<String>;

    /// Server launch argv for the planned image
    fn server_argv(&self, target: &str, host: &str, port: u16, reload: bool) -> Vec<String>;
}

/// Poetry with uvicorn as the ASGI server
#[derive(Debug, Clone)]
pub struct PoetryManager {
    version: String,
}

impl Default for PoetryManager {
    fn default() -> Self {
        Self::new(DEFAULT_POETRY_VERSION)
    }
}

impl PoetryManager {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl DependencyManager for PoetryManager {
    fn name(&self) -> &str {
        "poetry"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn manifest_files(&self) -> Vec<String> {
        vec![MANIFEST_FILE.to_string(), LOCK_FILE.to_string()]
    }

    fn install_manager_command(&self) -> String {
        format!("pip install --no-cache-dir poetry=={}", self.version)
    }

    fn configure_commands(&self) -> Vec<String> {
        vec!["poetry config virtualenvs.create false".to_string()]
    }

    fn install_dependencies_command(&self) -> String {
        "poetry install --no-root --no-interaction --no-ansi".to_string()
    }

    fn baseline_packages(&self) -> Vec<String> {
        ["pip", "setuptools", "wheel", "poetry"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn server_argv(&self, target: &str, host: &str, port: u16, reload: bool) -> Vec<String> {
        let mut argv = vec![
            "uvicorn".to_string(),
            target.to_string(),
            "--host".to_string(),
            host.to_string(),
            "--port".to_string(),
            port.to_string(),
        ];
        if reload {
            argv.push("--reload".to_string());
        }
        argv
    }
}
