//! `poetry.lock` reader

use super::{normalize_name, Manifest, ManifestError, LOCK_FILE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A package pinned by the lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    /// Environment markers scoping this pin, when the lock splits a package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_versions: Option<String>,
}

impl LockedPackage {
    fn same_scope(&self, other: &LockedPackage) -> bool {
        self.markers == other.markers && self.python_versions == other.python_versions
    }
}

/// Pinned package set, keyed by normalized name.
///
/// A name maps to more than one pin only when the lock splits it across
/// environment markers (for example one numpy per Python range).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockFile {
    pub packages: BTreeMap<String, Vec<LockedPackage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLock {
    #[serde(default)]
    package: Vec<RawPackage>,
    metadata: Option<RawMetadata>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    name: String,
    version: String,
    markers: Option<String>,
    #[serde(rename = "python-versions")]
    python_versions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(rename = "content-hash")]
    content_hash: Option<String>,
}

impl LockFile {
    /// Loads `poetry.lock` from a project directory
    pub fn load(project_dir: &Path) -> Result<Self, ManifestError> {
        let path = project_dir.join(LOCK_FILE);
        let content = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let raw: RawLock = toml::from_str(content).map_err(|e| ManifestError::Parse {
            file: LOCK_FILE.to_string(),
            message: e.message().to_string(),
        })?;

        let mut packages: BTreeMap<String, Vec<LockedPackage>> = BTreeMap::new();
        for pkg in raw.package {
            let key = normalize_name(&pkg.name);
            let candidate = LockedPackage {
                name: pkg.name,
                version: pkg.version,
                markers: pkg.markers,
                python_versions: pkg.python_versions,
            };
            let pins = packages.entry(key.clone()).or_default();

            if pins.iter().any(|p| p.version == candidate.version) {
                continue;
            }
            // Two versions for the same environment cannot both be installed
            if let Some(existing) = pins.iter().find(|p| p.same_scope(&candidate)) {
                return Err(ManifestError::ConflictingPins {
                    name: key,
                    first: existing.version.clone(),
                    second: candidate.version,
                });
            }
            pins.push(candidate);
        }

        Ok(Self {
            packages,
            content_hash: raw.metadata.and_then(|m| m.content_hash),
        })
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Pinned version for a package, looked up by any spelling of its name.
    /// For a marker-split package this is the first pin in lock order.
    pub fn pinned_version(&self, name: &str) -> Option<&str> {
        self.pins(name).first().map(|p| p.version.as_str())
    }

    /// Every pin recorded for a package
    pub fn pins(&self, name: &str) -> &[LockedPackage] {
        self.packages
            .get(&normalize_name(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Fails when the manifest declares a dependency the lock does not pin
    pub fn check_covers(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let unpinned: Vec<String> = manifest
            .dependency_names()
            .into_iter()
            .filter(|name| !self.packages.contains_key(name))
            .collect();

        if unpinned.is_empty() {
            Ok(())
        } else {
            Err(ManifestError::Unpinned(unpinned))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: &str = r#"
# This file is automatically @generated by Poetry 1.8.3 and should not be changed by hand.

[[package]]
name = "anyio"
version = "4.6.0"
description = "High level compatibility layer for multiple asynchronous event loop implementations"
optional = false
python-versions = ">=3.9"
files = []

[[package]]
name = "fastapi"
version = "0.115.0"
description = "FastAPI framework"
optional = false
python-versions = ">=3.8"
files = []

[package.dependencies]
starlette = ">=0.37.2,<0.39.0"

[[package]]
name = "typing-extensions"
version = "4.12.2"
description = ""
optional = false
python-versions = ">=3.8"
files = []

[metadata]
lock-version = "2.0"
python-versions = "^3.11"
content-hash = "abc123"
"#;

    #[test]
    fn test_parse_lock() {
        let lock = LockFile::parse(LOCK).unwrap();
        assert_eq!(lock.len(), 3);
        assert_eq!(lock.content_hash.as_deref(), Some("abc123"));
        assert_eq!(lock.pinned_version("FastAPI"), Some("0.115.0"));
        assert_eq!(lock.pinned_version("typing_extensions"), Some("4.12.2"));
        assert_eq!(lock.pinned_version("starlette"), None);
    }

    #[test]
    fn test_duplicate_identical_pins_collapse() {
        let lock = LockFile::parse(
            "[[package]]\nname = \"numpy\"\nversion = \"2.1.1\"\n\n[[package]]\nname = \"NumPy\"\nversion = \"2.1.1\"\n",
        )
        .unwrap();
        assert_eq!(lock.len(), 1);
    }

    #[test]
    fn test_conflicting_pins() {
        let err = LockFile::parse(
            "[[package]]\nname = \"numpy\"\nversion = \"1.26.4\"\n\n[[package]]\nname = \"numpy\"\nversion = \"2.1.1\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::ConflictingPins { .. }));
    }

    #[test]
    fn test_marker_split_pins_are_kept() {
        let lock = LockFile::parse(
            r#"
[[package]]
name = "numpy"
version = "1.26.4"
python-versions = ">=3.9"
markers = "python_version < \"3.12\""

[[package]]
name = "numpy"
version = "2.1.1"
python-versions = ">=3.10"
markers = "python_version >= \"3.12\""
"#,
        )
        .unwrap();

        assert_eq!(lock.len(), 1);
        let versions: Vec<&str> = lock.pins("NumPy").iter().map(|p| p.version.as_str()).collect();
        assert_eq!(versions, vec!["1.26.4", "2.1.1"]);
        assert_eq!(lock.pinned_version("numpy"), Some("1.26.4"));
    }

    #[test]
    fn test_python_range_split_without_markers() {
        let lock = LockFile::parse(
            "[[package]]\nname = \"numpy\"\nversion = \"1.26.4\"\npython-versions = \">=3.9\"\n\n[[package]]\nname = \"numpy\"\nversion = \"2.1.1\"\npython-versions = \">=3.10\"\n",
        )
        .unwrap();
        assert_eq!(lock.pins("numpy").len(), 2);
    }

    #[test]
    fn test_same_markers_different_versions_conflict() {
        let err = LockFile::parse(
            "[[package]]\nname = \"numpy\"\nversion = \"1.26.4\"\nmarkers = \"sys_platform == 'linux'\"\n\n[[package]]\nname = \"numpy\"\nversion = \"2.1.1\"\nmarkers = \"sys_platform == 'linux'\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::ConflictingPins { ref name, .. } if name == "numpy"));
    }

    #[test]
    fn test_check_covers() {
        let lock = LockFile::parse(LOCK).unwrap();
        let covered = Manifest::parse(
            "[tool.poetry]\nname = \"a\"\n[tool.poetry.dependencies]\npython = \"^3.11\"\nFastAPI = \"*\"\n",
        )
        .unwrap();
        assert!(lock.check_covers(&covered).is_ok());

        let stale = Manifest::parse(
            "[tool.poetry]\nname = \"a\"\n[tool.poetry.dependencies]\nfastapi = \"*\"\nhttpx = \"*\"\n",
        )
        .unwrap();
        match lock.check_covers(&stale) {
            Err(ManifestError::Unpinned(names)) => assert_eq!(names, vec!["httpx".to_string()]),
            other => panic!("expected Unpinned, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_lock() {
        let lock = LockFile::parse("").unwrap();
        assert!(lock.is_empty());
        assert!(lock.content_hash.is_none());
    }
}
