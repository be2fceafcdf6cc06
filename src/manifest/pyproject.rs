//! `pyproject.toml` reader for Poetry-managed projects

use super::{normalize_name, ManifestError, MANIFEST_FILE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Group name used for `[tool.poetry.dependencies]`
pub const MAIN_GROUP: &str = "main";

/// A dependency declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    pub name: String,
    /// Version constraint as written, or a short description for path/git sources
    pub constraint: String,
    pub group: String,
    pub optional: bool,
}

/// The parts of a Poetry manifest the build procedure cares about
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Documentation files referenced by the manifest (copied with it)
    pub readme: Vec<String>,
    pub dependencies: Vec<DeclaredDependency>,
}

#[derive(Debug, Deserialize)]
struct PyProject {
    tool: Option<ToolTable>,
    project: Option<ProjectTable>,
}

#[derive(Debug, Deserialize)]
struct ToolTable {
    poetry: Option<PoetryTable>,
}

#[derive(Debug, Deserialize)]
struct ProjectTable {
    readme: Option<ReadmeField>,
}

#[derive(Debug, Deserialize)]
struct PoetryTable {
    name: Option<String>,
    version: Option<String>,
    readme: Option<ReadmeField>,
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    group: BTreeMap<String, GroupTable>,
}

#[derive(Debug, Deserialize)]
struct GroupTable {
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReadmeField {
    One(String),
    Many(Vec<String>),
    // PEP 621 table form: { file = "README.md", content-type = "..." }
    Table { file: Option<String> },
}

impl ReadmeField {
    fn into_files(self) -> Vec<String> {
        match self {
            ReadmeField::One(file) => vec![file],
            ReadmeField::Many(files) => files,
            ReadmeField::Table { file } => file.into_iter().collect(),
        }
    }
}

impl Manifest {
    /// Loads `pyproject.toml` from a project directory
    pub fn load(project_dir: &Path) -> Result<Self, ManifestError> {
        let path = project_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses manifest text
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let doc: PyProject = toml::from_str(content).map_err(|e| ManifestError::Parse {
            file: MANIFEST_FILE.to_string(),
            message: e.message().to_string(),
        })?;

        let poetry = doc
            .tool
            .and_then(|t| t.poetry)
            .ok_or_else(|| ManifestError::NotPoetryProject(MANIFEST_FILE.to_string()))?;

        let readme = poetry
            .readme
            .or(doc.project.and_then(|p| p.readme))
            .map(ReadmeField::into_files)
            .unwrap_or_default();

        let mut dependencies = Vec::new();
        collect_group(&mut dependencies, MAIN_GROUP, &poetry.dependencies);
        collect_group(&mut dependencies, "dev", &poetry.dev_dependencies);
        for (group, table) in &poetry.group {
            collect_group(&mut dependencies, group, &table.dependencies);
        }

        Ok(Self {
            name: poetry.name,
            version: poetry.version,
            readme,
            dependencies,
        })
    }

    /// Normalized names of every declared dependency
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dependencies
            .iter()
            .map(|d| normalize_name(&d.name))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Files copied into the image before dependencies are installed,
    /// besides the manifest and lock themselves
    pub fn companion_files(&self) -> &[String] {
        &self.readme
    }
}

fn collect_group(
    out: &mut Vec<DeclaredDependency>,
    group: &str,
    table: &BTreeMap<String, toml::Value>,
) {
    for (name, spec) in table {
        // The interpreter constraint is not a package
        if name.eq_ignore_ascii_case("python") {
            continue;
        }
        let (constraint, optional) = describe_spec(spec);
        out.push(DeclaredDependency {
            name: name.clone(),
            constraint,
            group: group.to_string(),
            optional,
        });
    }
}

fn describe_spec(spec: &toml::Value) -> (String, bool) {
    match spec {
        toml::Value::String(version) => (version.clone(), false),
        toml::Value::Table(table) => {
            let optional = table
                .get("optional")
                .and_then(toml::Value::as_bool)
                .unwrap_or(false);
            let constraint = ["version", "path", "git", "url"]
                .iter()
                .find_map(|key| {
                    table
                        .get(*key)
                        .and_then(toml::Value::as_str)
                        .map(|v| if *key == "version" { v.to_string() } else { format!("{}: {}", key, v) })
                })
                .unwrap_or_else(|| "*".to_string());
            (constraint, optional)
        }
        // Multiple-constraint form: a list of tables keyed by python/platform markers
        toml::Value::Array(items) => {
            let versions: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("version").and_then(toml::Value::as_str))
                .collect();
            (versions.join(" || "), false)
        }
        other => (other.to_string(), false),
    }
}
