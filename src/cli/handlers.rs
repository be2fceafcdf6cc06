//! Subcommand handlers
//!
//! Each handler logs its failure and returns the process exit code.

use super::commands::{AppsArgs, OutputFormatArg, PlanArgs, ServeArgs, VerifyArgs};
use super::output::{OutputFormat, OutputFormatter};
use crate::config::{BerthConfig, ConfigOverrides};
use crate::environment::RuntimeEnv;
use crate::exit;
use crate::image::{
    layer_cache_keys, DependencyManager, ImagePlan, PlanOptions, PoetryManager, ProjectSources,
};
use crate::launch::{self, AppRegistry};
use crate::manifest::{verify_installed, InstalledSet, LockFile};
use anyhow::{Context, Result};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

fn project_dir(path: &Option<PathBuf>) -> PathBuf {
    path.clone().unwrap_or_else(|| PathBuf::from("."))
}

fn emit(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

pub async fn handle_serve(args: &ServeArgs, registry: AppRegistry) -> i32 {
    let mut config = match BerthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return exit::CONFIG;
        }
    };

    config.apply_overrides(ConfigOverrides {
        app_target: args.target.clone(),
        host: args.host.clone(),
        port: args.port,
        reload: args.reload_override(),
        reload_dirs: args.reload_dirs.clone(),
        reload_extensions: args.reload_extensions.clone(),
        shutdown_timeout_secs: args.shutdown_timeout,
        log_level: None,
    });
    debug!("Effective configuration: {:?}", config.to_display_map());

    match launch::launch(&config, Arc::new(registry)).await {
        Ok(()) => {
            info!("Shut down cleanly");
            exit::OK
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

pub fn handle_plan(args: &PlanArgs) -> i32 {
    let root = project_dir(&args.project_path);

    let sources = match ProjectSources::load(&root) {
        Ok(sources) => sources,
        Err(e) => {
            error!("{}", e);
            return e.exit_code();
        }
    };

    if args.dev {
        warn!("Planning a development image: the launch command will reload on changes");
    }

    let manager = PoetryManager::new(args.manager_version.clone());
    let options = PlanOptions {
        base_image: args.base_image.clone(),
        workdir: args.workdir.clone(),
        app_target: args.app.clone(),
        port: args.port,
        dev_mode: args.dev,
        runtime_env: RuntimeEnv::default(),
        ..PlanOptions::default()
    };

    let plan = match ImagePlan::build(&sources, &manager, &options) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{}", e);
            return e.exit_code();
        }
    };

    let formatter = OutputFormatter::new(args.format.into());
    let rendered = if args.cache_keys {
        let keys = match layer_cache_keys(&plan, &root) {
            Ok(keys) => keys,
            Err(e) => {
                error!("{}", e);
                return e.exit_code();
            }
        };
        // Dockerfile text makes no sense for keys; fall back to the table
        let formatter = if args.format == OutputFormatArg::Dockerfile {
            OutputFormatter::new(OutputFormat::Human)
        } else {
            formatter
        };
        formatter.format_cache_keys(&keys)
    } else {
        formatter.format_plan(&plan)
    };

    match rendered.and_then(|content| emit(&content, args.output.as_deref())) {
        Ok(()) => exit::OK,
        Err(e) => {
            error!("{:#}", e);
            exit::FAILURE
        }
    }
}

fn read_installed(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read installed set from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

pub fn handle_verify(args: &VerifyArgs) -> i32 {
    let root = project_dir(&args.project_path);

    let lock = match LockFile::load(&root) {
        Ok(lock) => lock,
        Err(e) => {
            error!("{}", e);
            return exit::BUILD_FAILURE;
        }
    };

    let freeze = match read_installed(&args.installed) {
        Ok(content) => content,
        Err(e) => {
            error!("{:#}", e);
            return exit::FAILURE;
        }
    };

    let installed = match InstalledSet::parse_freeze(&freeze) {
        Ok(set) => set,
        Err(e) => {
            error!("{}", e);
            return exit::BUILD_FAILURE;
        }
    };

    let mut ignore = PoetryManager::default().baseline_packages();
    ignore.extend(args.ignore.iter().cloned());
    let report = verify_installed(&lock, &installed, &ignore);

    let format = match args.format {
        OutputFormatArg::Dockerfile => OutputFormat::Human,
        other => other.into(),
    };
    if let Err(e) = OutputFormatter::new(format)
        .format_drift(&report)
        .and_then(|content| emit(&content, None))
    {
        error!("{:#}", e);
        return exit::FAILURE;
    }

    if report.is_exact() {
        exit::OK
    } else {
        error!(
            "Installed set drifts from lock: {} missing, {} unexpected, {} mismatched",
            report.missing.len(),
            report.unexpected.len(),
            report.mismatched.len()
        );
        exit::BUILD_FAILURE
    }
}

pub fn handle_apps(args: &AppsArgs, registry: &AppRegistry) -> i32 {
    // `serve` without a target launches whatever BERTH_APP names
    let default_target = match BerthConfig::from_env() {
        Ok(config) => config.app_target,
        Err(e) => {
            error!("{}", e);
            return exit::CONFIG;
        }
    };
    let format = match args.format {
        OutputFormatArg::Dockerfile => OutputFormat::Human,
        other => other.into(),
    };

    match OutputFormatter::new(format)
        .format_apps(&registry.targets(), &default_target)
        .and_then(|content| emit(&content, None))
    {
        Ok(()) => exit::OK,
        Err(e) => {
            error!("{:#}", e);
            exit::FAILURE
        }
    }
}
