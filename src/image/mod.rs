//! Container image build planning
//!
//! Turns a project (manifest, lock, referenced docs) into an ordered image plan:
//! base image, runtime flags, pinned dependency manager installed into the
//! global environment, manifest files copied and dependencies installed, and
//! only then the full source tree. The ordering keeps the dependency layer
//! cached across source-only changes; [`cache::layer_cache_keys`] makes that
//! property checkable.

pub mod cache;
pub mod dockerfile;
pub mod manager;
pub mod plan;

pub use cache::{layer_cache_keys, LayerKey};
pub use dockerfile::render_dockerfile;
pub use manager::{DependencyManager, PoetryManager};
pub use plan::{ImagePlan, Instruction, LayerRole, PlanOptions, PlanStep, ProjectSources};

use crate::exit;
use crate::manifest::ManifestError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Manifest references {0}, which does not exist in the project")]
    MissingCompanion(String),

    #[error("{0}")]
    InvalidTarget(String),

    #[error("Plan violates layer ordering: {0}")]
    Ordering(String),

    #[error("Failed to hash {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk source tree: {0}")]
    Walk(String),
}

impl PlanError {
    /// Every planning failure is a build-time failure
    pub fn exit_code(&self) -> i32 {
        exit::BUILD_FAILURE
    }
}
