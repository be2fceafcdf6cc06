//! Dependency manifest, lock file and installed-set handling
//!
//! The build procedure consumes three inputs: the manifest (`pyproject.toml`),
//! the lock (`poetry.lock`) and the documentation file the manifest references.
//! The installed set (a `pip freeze` listing) is only used after a build to
//! prove it matches the lock exactly.

pub mod installed;
pub mod lock;
pub mod pyproject;

pub use installed::{verify_installed, DriftReport, InstalledPackage, InstalledSet, VersionMismatch};
pub use lock::{LockFile, LockedPackage};
pub use pyproject::{DeclaredDependency, Manifest};

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "pyproject.toml";
pub const LOCK_FILE: &str = "poetry.lock";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("{0} does not declare a [tool.poetry] section")]
    NotPoetryProject(String),

    #[error("Package {name} is locked twice with different versions ({first} and {second})")]
    ConflictingPins {
        name: String,
        first: String,
        second: String,
    },

    #[error("Lock file is out of date; unpinned dependencies: {}", .0.join(", "))]
    Unpinned(Vec<String>),

    #[error("Invalid freeze line {line_no}: {line}")]
    Freeze { line_no: usize, line: String },
}

/// Normalizes a package name the way the package index does (PEP 503):
/// lowercase, with runs of `-`, `_` and `.` collapsed to a single `-`.
pub fn normalize_name(name: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let re = SEPARATORS.get_or_init(|| Regex::new(r"[-_.]+").expect("valid regex"));
    re.replace_all(name.trim(), "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("FastAPI"), "fastapi");
        assert_eq!(normalize_name("typing_extensions"), "typing-extensions");
        assert_eq!(normalize_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_name("Foo__Bar-.baz"), "foo-bar-baz");
        assert_eq!(normalize_name("  uvicorn "), "uvicorn");
    }

    #[test]
    fn test_unpinned_error_lists_names() {
        let err = ManifestError::Unpinned(vec!["httpx".to_string(), "jinja2".to_string()]);
        assert_eq!(
            err.to_string(),
            "Lock file is out of date; unpinned dependencies: httpx, jinja2"
        );
    }
}
