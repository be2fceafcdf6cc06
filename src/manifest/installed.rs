//! Installed package set and lock drift detection

use super::{normalize_name, LockFile, LockedPackage, ManifestError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// Packages present in an environment, keyed by normalized name
#[derive(Debug, Clone, Default)]
pub struct InstalledSet {
    packages: BTreeMap<String, InstalledPackage>,
}

impl InstalledSet {
    /// Parses `pip freeze` output.
    ///
    /// Blank lines, comments, option lines (`-e ...`, `--index-url ...`) and
    /// direct references (`name @ url`) are skipped; everything else must be
    /// `name==version`.
    pub fn parse_freeze(content: &str) -> Result<Self, ManifestError> {
        let mut packages = BTreeMap::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                continue;
            }
            if line.contains(" @ ") {
                continue;
            }

            let (name, version) = line.split_once("==").ok_or_else(|| ManifestError::Freeze {
                line_no: idx + 1,
                line: line.to_string(),
            })?;
            // `===` arbitrary equality leaves a stray '='
            let version = version.trim_start_matches('=').trim();
            let name = name.trim();
            if name.is_empty() || version.is_empty() {
                return Err(ManifestError::Freeze {
                    line_no: idx + 1,
                    line: line.to_string(),
                });
            }

            packages.insert(
                normalize_name(name),
                InstalledPackage {
                    name: name.to_string(),
                    version: version.to_string(),
                },
            );
        }

        Ok(Self { packages })
    }

    pub fn from_packages(packages: impl IntoIterator<Item = InstalledPackage>) -> Self {
        Self {
            packages: packages
                .into_iter()
                .map(|p| (normalize_name(&p.name), p))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMismatch {
    pub name: String,
    pub locked: String,
    pub installed: String,
}

/// Differences between a lock file and an installed set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriftReport {
    /// Locked but not installed
    pub missing: Vec<LockedPackage>,
    /// Installed but not locked
    pub unexpected: Vec<InstalledPackage>,
    pub mismatched: Vec<VersionMismatch>,
    /// Number of packages that matched their pin
    pub matched: usize,
}

impl DriftReport {
    /// True when the installed set is exactly the locked set
    pub fn is_exact(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            return write!(f, "Installed set matches lock ({} packages)", self.matched);
        }

        writeln!(f, "Installed set drifts from lock:")?;
        for pkg in &self.missing {
            match &pkg.markers {
                Some(markers) => writeln!(f, "  missing     {}=={} ; {}", pkg.name, pkg.version, markers)?,
                None => writeln!(f, "  missing     {}=={}", pkg.name, pkg.version)?,
            }
        }
        for pkg in &self.unexpected {
            writeln!(f, "  unexpected  {}=={}", pkg.name, pkg.version)?;
        }
        for m in &self.mismatched {
            writeln!(f, "  mismatched  {} (locked {}, installed {})", m.name, m.locked, m.installed)?;
        }
        write!(f, "  {} matched", self.matched)
    }
}

/// Compares an installed set against the lock.
///
/// `ignore` names packages that live in the environment for reasons other than
/// the lock (the dependency manager itself, pip, setuptools); they are skipped
/// on the installed side only.
pub fn verify_installed(lock: &LockFile, installed: &InstalledSet, ignore: &[String]) -> DriftReport {
    let ignored: HashSet<String> = ignore.iter().map(|n| normalize_name(n)).collect();
    let mut report = DriftReport::default();

    for (key, pins) in &lock.packages {
        match installed.packages.get(key) {
            None => report.missing.extend(pins.iter().cloned()),
            // A marker-split package is satisfied by whichever pin applies here
            Some(actual) if !pins.iter().any(|p| p.version == actual.version) => {
                report.mismatched.push(VersionMismatch {
                    name: pins.first().map(|p| p.name.clone()).unwrap_or_else(|| key.clone()),
                    locked: pins.iter().map(|p| p.version.as_str()).collect::<Vec<_>>().join(" | "),
                    installed: actual.version.clone(),
                })
            }
            Some(_) => report.matched += 1,
        }
    }

    for (key, actual) in &installed.packages {
        if !lock.packages.contains_key(key) && !ignored.contains(key) {
            report.unexpected.push(actual.clone());
        }
    }

    report
}
