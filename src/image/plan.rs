//! Image plan data structures
//!
//! An [`ImagePlan`] is an ordered list of build instructions, each tagged with
//! the role its layer plays. Roles make the ordering invariant checkable
//! without string-matching commands.

use super::manager::DependencyManager;
use super::PlanError;
use crate::environment::RuntimeEnv;
use crate::launch::AppTarget;
use crate::manifest::{LockFile, Manifest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_BASE_IMAGE: &str = "python:3.11-slim";
pub const DEFAULT_WORKDIR: &str = "/app";
pub const DEFAULT_IMAGE_TARGET: &str = "main:app";
pub const DEFAULT_IMAGE_PORT: u16 = 8000;

/// A single image build instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    From { image: String },
    Env { vars: Vec<(String, String)> },
    Workdir { path: String },
    Run { command: String },
    Copy { sources: Vec<String>, dest: String },
    Expose { port: u16 },
    Cmd { argv: Vec<String> },
}

fn quote_if_needed(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        serde_json::Value::String(value.to_string()).to_string()
    } else {
        value.to_string()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::From { image } => write!(f, "FROM {}", image),
            Instruction::Env { vars } => {
                let pairs: Vec<String> = vars
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, quote_if_needed(v)))
                    .collect();
                write!(f, "ENV {}", pairs.join(" "))
            }
            Instruction::Workdir { path } => write!(f, "WORKDIR {}", path),
            Instruction::Run { command } => write!(f, "RUN {}", command),
            Instruction::Copy { sources, dest } => {
                write!(f, "COPY {} {}", sources.join(" "), dest)
            }
            Instruction::Expose { port } => write!(f, "EXPOSE {}", port),
            Instruction::Cmd { argv } => {
                let quoted: Vec<String> = argv
                    .iter()
                    .map(|a| serde_json::Value::String(a.clone()).to_string())
                    .collect();
                write!(f, "CMD [{}]", quoted.join(", "))
            }
        }
    }
}

/// What a layer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerRole {
    Base,
    Environment,
    WorkingDirectory,
    ManagerInstall,
    ManagerConfig,
    ManifestCopy,
    DependencyInstall,
    SourceCopy,
    Expose,
    Launch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub role: LayerRole,
    pub instruction: Instruction,
}

impl PlanStep {
    fn new(role: LayerRole, instruction: Instruction) -> Self {
        Self { role, instruction }
    }
}

/// Knobs for plan generation
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub base_image: String,
    pub workdir: String,
    /// `module.path:attr` of the application object inside the image
    pub app_target: String,
    pub host: String,
    pub port: u16,
    /// Emit the reload flag in the launch command; never on for production images
    pub dev_mode: bool,
    pub runtime_env: RuntimeEnv,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            workdir: DEFAULT_WORKDIR.to_string(),
            app_target: DEFAULT_IMAGE_TARGET.to_string(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_IMAGE_PORT,
            dev_mode: false,
            runtime_env: RuntimeEnv::default(),
        }
    }
}

/// Build inputs read from a project directory
#[derive(Debug, Clone)]
pub struct ProjectSources {
    pub root: PathBuf,
    pub manifest: Manifest,
    pub lock: LockFile,
}

impl ProjectSources {
    /// Loads manifest and lock, and checks the lock pins every declared
    /// dependency and that referenced documentation files exist.
    pub fn load(root: &Path) -> Result<Self, PlanError> {
        let manifest = Manifest::load(root)?;
        let lock = LockFile::load(root)?;
        lock.check_covers(&manifest)?;

        for file in manifest.companion_files() {
            if !root.join(file).is_file() {
                return Err(PlanError::MissingCompanion(file.clone()));
            }
        }

        debug!(
            "Loaded project at {}: {} declared, {} locked",
            root.display(),
            manifest.dependencies.len(),
            lock.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            manifest,
            lock,
        })
    }
}

/// Ordered container image plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Dependency manager and its pinned version, e.g. `poetry==1.8.3`
    pub manager: String,
    /// Number of packages pinned by the lock, i.e. the exact installed set size
    pub locked_packages: usize,
    pub dev_mode: bool,
    pub steps: Vec<PlanStep>,
}

impl ImagePlan {
    pub fn build(
        sources: &ProjectSources,
        manager: &dyn DependencyManager,
        options: &PlanOptions,
    ) -> Result<Self, PlanError> {
        // The image would otherwise build fine and fail on first boot
        let target = AppTarget::parse(&options.app_target)
            .map_err(|e| PlanError::InvalidTarget(e.to_string()))?;

        let mut steps = vec![PlanStep::new(
            LayerRole::Base,
            Instruction::From {
                image: options.base_image.clone(),
            },
        )];

        let env = options.runtime_env.image_env();
        if !env.is_empty() {
            steps.push(PlanStep::new(
                LayerRole::Environment,
                Instruction::Env { vars: env },
            ));
        }

        steps.push(PlanStep::new(
            LayerRole::WorkingDirectory,
            Instruction::Workdir {
                path: options.workdir.clone(),
            },
        ));
        steps.push(PlanStep::new(
            LayerRole::ManagerInstall,
            Instruction::Run {
                command: manager.install_manager_command(),
            },
        ));
        for command in manager.configure_commands() {
            steps.push(PlanStep::new(
                LayerRole::ManagerConfig,
                Instruction::Run { command },
            ));
        }

        let mut manifest_files = manager.manifest_files();
        manifest_files.extend(sources.manifest.companion_files().iter().cloned());
        steps.push(PlanStep::new(
            LayerRole::ManifestCopy,
            Instruction::Copy {
                sources: manifest_files,
                dest: "./".to_string(),
            },
        ));
        steps.push(PlanStep::new(
            LayerRole::DependencyInstall,
            Instruction::Run {
                command: manager.install_dependencies_command(),
            },
        ));
        steps.push(PlanStep::new(
            LayerRole::SourceCopy,
            Instruction::Copy {
                sources: vec![".".to_string()],
                dest: ".".to_string(),
            },
        ));
        steps.push(PlanStep::new(
            LayerRole::Expose,
            Instruction::Expose { port: options.port },
        ));
        steps.push(PlanStep::new(
            LayerRole::Launch,
            Instruction::Cmd {
                argv: manager.server_argv(
                    &target.to_string(),
                    &options.host,
                    options.port,
                    options.dev_mode,
                ),
            },
        ));

        let plan = Self {
            project: sources.manifest.name.clone(),
            manager: format!("{}=={}", manager.name(), manager.version()),
            locked_packages: sources.lock.len(),
            dev_mode: options.dev_mode,
            steps,
        };
        plan.validate()?;
        Ok(plan)
    }

    fn position(&self, role: LayerRole) -> Option<usize> {
        self.steps.iter().position(|s| s.role == role)
    }

    fn last_position(&self, role: LayerRole) -> Option<usize> {
        self.steps.iter().rposition(|s| s.role == role)
    }

    /// Checks the layer ordering invariant:
    ///
    /// - the base image comes first and only once
    /// - the manager is installed before it is configured, and both before
    ///   dependencies are installed
    /// - manifest files are copied before dependencies are installed, which
    ///   happens before the full source tree is copied
    /// - exactly one launch command, and it is last
    pub fn validate(&self) -> Result<(), PlanError> {
        let ordering = |msg: &str| Err(PlanError::Ordering(msg.to_string()));

        if self.steps.first().map(|s| s.role) != Some(LayerRole::Base) {
            return ordering("plan must start with the base image");
        }
        if self.steps.iter().filter(|s| s.role == LayerRole::Base).count() != 1 {
            return ordering("plan must have exactly one base image");
        }

        let manager_install = self.position(LayerRole::ManagerInstall);
        let manifest_copy = self.position(LayerRole::ManifestCopy);
        let deps = self.position(LayerRole::DependencyInstall);
        let source = self.position(LayerRole::SourceCopy);

        let (Some(manager_install), Some(manifest_copy), Some(deps), Some(source)) =
            (manager_install, manifest_copy, deps, source)
        else {
            return ordering("plan is missing a manager install, manifest copy, dependency install or source copy");
        };

        if let Some(last_config) = self.last_position(LayerRole::ManagerConfig) {
            let first_config = self.position(LayerRole::ManagerConfig).unwrap_or(last_config);
            if first_config < manager_install || last_config > deps {
                return ordering("manager configuration must sit between manager install and dependency install");
            }
        }
        if manager_install > deps {
            return ordering("dependency manager must be installed before dependencies");
        }
        if manifest_copy > deps {
            return ordering("manifest files must be copied before dependencies are installed");
        }
        if deps > source {
            return ordering("dependencies must be installed before the source tree is copied");
        }

        let launches = self.steps.iter().filter(|s| s.role == LayerRole::Launch).count();
        if launches != 1 || self.steps.last().map(|s| s.role) != Some(LayerRole::Launch) {
            return ordering("plan must end with exactly one launch command");
        }

        Ok(())
    }

    pub fn launch_argv(&self) -> &[String] {
        match self.steps.last().map(|s| &s.instruction) {
            Some(Instruction::Cmd { argv }) => argv,
            _ => &[],
        }
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        use anyhow::Context;
        serde_yaml::to_string(self).context("Failed to serialize ImagePlan to YAML")
    }
}

impl fmt::Display for ImagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Image Build Plan")?;
        writeln!(f, "================")?;
        if let Some(ref project) = self.project {
            writeln!(f, "Project:  {}", project)?;
        }
        writeln!(f, "Manager:  {}", self.manager)?;
        writeln!(f, "Packages: {} pinned", self.locked_packages)?;
        writeln!(
            f,
            "Mode:     {}",
            if self.dev_mode { "development (reload on)" } else { "production" }
        )?;
        writeln!(f)?;
        writeln!(f, "Steps:")?;
        for (idx, step) in self.steps.iter().enumerate() {
            writeln!(f, "  {:>2}. [{:?}] {}", idx + 1, step.role, step.instruction)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::PoetryManager;

    fn sources() -> ProjectSources {
        ProjectSources {
            root: PathBuf::from("/project"),
            manifest: Manifest::parse(
                "[tool.poetry]\nname = \"svc\"\nreadme = \"README.md\"\n[tool.poetry.dependencies]\nfastapi = \"*\"\n",
            )
            .unwrap(),
            lock: LockFile::parse(
                "[[package]]\nname = \"fastapi\"\nversion = \"0.115.0\"\n\n[[package]]\nname = \"starlette\"\nversion = \"0.38.6\"\n",
            )
            .unwrap(),
        }
    }

    fn plan(options: &PlanOptions) -> ImagePlan {
        ImagePlan::build(&sources(), &PoetryManager::default(), options).unwrap()
    }

    #[test]
    fn test_plan_order() {
        let plan = plan(&PlanOptions::default());
        let roles: Vec<LayerRole> = plan.steps.iter().map(|s| s.role).collect();
        assert_eq!(
            roles,
            vec![
                LayerRole::Base,
                LayerRole::Environment,
                LayerRole::WorkingDirectory,
                LayerRole::ManagerInstall,
                LayerRole::ManagerConfig,
                LayerRole::ManifestCopy,
                LayerRole::DependencyInstall,
                LayerRole::SourceCopy,
                LayerRole::Expose,
                LayerRole::Launch,
            ]
        );
        assert_eq!(plan.project.as_deref(), Some("svc"));
        assert_eq!(plan.manager, "poetry==1.8.3");
        assert_eq!(plan.locked_packages, 2);
    }

    #[test]
    fn test_manifest_copy_includes_readme() {
        let plan = plan(&PlanOptions::default());
        let copy = plan
            .steps
            .iter()
            .find(|s| s.role == LayerRole::ManifestCopy)
            .unwrap();
        assert_eq!(
            copy.instruction.to_string(),
            "COPY pyproject.toml poetry.lock README.md ./"
        );
    }

    #[test]
    fn test_production_plan_has_no_reload() {
        let plan = plan(&PlanOptions::default());
        assert!(!plan.launch_argv().iter().any(|a| a == "--reload"));
        assert_eq!(plan.launch_argv()[1], DEFAULT_IMAGE_TARGET);
    }

    #[test]
    fn test_dev_plan_has_reload() {
        let plan = plan(&PlanOptions {
            dev_mode: true,
            ..Default::default()
        });
        assert!(plan.launch_argv().iter().any(|a| a == "--reload"));
    }

    #[test]
    fn test_invalid_app_target_fails_planning() {
        for bad in ["not a target", "main", "main:app:extra", "1main:app"] {
            let err = ImagePlan::build(
                &sources(),
                &PoetryManager::default(),
                &PlanOptions {
                    app_target: bad.to_string(),
                    ..Default::default()
                },
            )
            .unwrap_err();
            assert!(matches!(err, PlanError::InvalidTarget(_)), "{} should be rejected", bad);
            assert_eq!(err.exit_code(), crate::exit::BUILD_FAILURE);
        }
    }

    #[test]
    fn test_env_step_omitted_when_no_flags() {
        let plan = plan(&PlanOptions {
            runtime_env: RuntimeEnv {
                unbuffered_output: false,
                no_bytecode_writes: false,
            },
            ..Default::default()
        });
        assert!(!plan.steps.iter().any(|s| s.role == LayerRole::Environment));
    }

    #[test]
    fn test_validate_rejects_source_before_deps() {
        let mut plan = plan(&PlanOptions::default());
        let deps = plan.position(LayerRole::DependencyInstall).unwrap();
        let source = plan.position(LayerRole::SourceCopy).unwrap();
        plan.steps.swap(deps, source);
        assert!(matches!(plan.validate(), Err(PlanError::Ordering(_))));
    }

    #[test]
    fn test_validate_rejects_missing_launch() {
        let mut plan = plan(&PlanOptions::default());
        plan.steps.pop();
        assert!(matches!(plan.validate(), Err(PlanError::Ordering(_))));
    }

    #[test]
    fn test_validate_rejects_config_before_install() {
        let mut plan = plan(&PlanOptions::default());
        let install = plan.position(LayerRole::ManagerInstall).unwrap();
        let config = plan.position(LayerRole::ManagerConfig).unwrap();
        plan.steps.swap(install, config);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_instruction_display() {
        assert_eq!(
            Instruction::Env {
                vars: vec![("A".into(), "1".into()), ("B".into(), "two words".into())]
            }
            .to_string(),
            "ENV A=1 B=\"two words\""
        );
        assert_eq!(
            Instruction::Cmd {
                argv: vec!["uvicorn".into(), "main:app".into()]
            }
            .to_string(),
            "CMD [\"uvicorn\", \"main:app\"]"
        );
    }

    #[test]
    fn test_human_display() {
        let text = plan(&PlanOptions::default()).to_string();
        assert!(text.contains("Manager:  poetry==1.8.3"));
        assert!(text.contains("production"));
        assert!(text.contains("[DependencyInstall] RUN poetry install --no-root"));
    }

    #[test]
    fn test_project_sources_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pyproject.toml"),
            "[tool.poetry]\nname = \"svc\"\nreadme = \"README.md\"\n[tool.poetry.dependencies]\nfastapi = \"*\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("poetry.lock"),
            "[[package]]\nname = \"fastapi\"\nversion = \"0.115.0\"\n",
        )
        .unwrap();

        let err = ProjectSources::load(dir.path()).unwrap_err();
        assert!(matches!(err, PlanError::MissingCompanion(ref f) if f == "README.md"));

        std::fs::write(dir.path().join("README.md"), "# svc\n").unwrap();
        let sources = ProjectSources::load(dir.path()).unwrap();
        assert_eq!(sources.lock.len(), 1);
    }
}
