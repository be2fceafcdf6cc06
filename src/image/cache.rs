//! Layer cache keys
//!
//! Each layer's key chains the previous key with the instruction text and, for
//! copy layers, the content hash of what gets copied. This mirrors how an image
//! builder decides whether a cached layer can be reused: a change to a file only
//! invalidates the first layer that copies it and everything after.

use super::plan::{ImagePlan, Instruction, LayerRole};
use super::PlanError;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerKey {
    pub index: usize,
    pub role: LayerRole,
    pub key: String,
}

/// Computes the cache key of every layer of `plan` against the build context at `root`
pub fn layer_cache_keys(plan: &ImagePlan, root: &Path) -> Result<Vec<LayerKey>, PlanError> {
    let mut keys = Vec::with_capacity(plan.steps.len());
    let mut previous = String::new();

    for (index, step) in plan.steps.iter().enumerate() {
        let mut hasher = Sha256::new();
        hasher.update(previous.as_bytes());
        hasher.update(step.instruction.to_string().as_bytes());

        if let Instruction::Copy { sources, .. } = &step.instruction {
            for source in sources {
                hasher.update(hash_copy_source(root, source)?.as_bytes());
            }
        }

        let key = hex::encode(hasher.finalize());
        keys.push(LayerKey {
            index,
            role: step.role,
            key: key.clone(),
        });
        previous = key;
    }

    Ok(keys)
}

fn hash_copy_source(root: &Path, source: &str) -> Result<String, PlanError> {
    let path = root.join(source);
    if path.is_dir() {
        hash_tree(&path)
    } else {
        hash_file(&path, source)
    }
}

fn hash_file(path: &Path, label: &str) -> Result<String, PlanError> {
    let bytes = fs::read(path).map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update([0u8]);
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Hashes every file the build context would send for `dir`.
///
/// Only `.dockerignore` filters the walk. `.gitignore`, global git excludes
/// and ignore files in parent directories do not shrink a container build
/// context, so they are not consulted. `.dockerignore` is read with gitignore
/// semantics, which covers the common patterns but not the `**`-anchoring
/// differences of the container builder.
fn hash_tree(dir: &Path) -> Result<String, PlanError> {
    let mut files: Vec<PathBuf> = Vec::new();

    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .add_custom_ignore_filename(".dockerignore")
        .build();

    for entry in walker {
        let entry = entry.map_err(|e| PlanError::Walk(e.to_string()))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            files.push(entry.into_path());
        }
    }
    files.sort();

    let mut hasher = Sha256::new();
    for file in &files {
        let relative = file.strip_prefix(dir).unwrap_or(file);
        let label = relative.to_string_lossy().replace('\\', "/");
        hasher.update(hash_file(file, &label)?.as_bytes());
    }
    debug!("Hashed {} files under {}", files.len(), dir.display());

    Ok(hex::encode(hasher.finalize()))
}
