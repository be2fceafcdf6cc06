//! Output formatting for multiple formats
//!
//! Plans, drift reports, cache keys and the application list can each be
//! rendered as JSON, YAML or human-readable text. Plans additionally render as
//! a Dockerfile.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

use crate::image::{render_dockerfile, ImagePlan, LayerKey};
use crate::launch::AppTarget;
use crate::manifest::DriftReport;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
    /// Dockerfile text; only meaningful for plans
    Dockerfile,
}

/// Formats command results according to the selected format
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_plan(&self, plan: &ImagePlan) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(plan, "image plan"),
            OutputFormat::Yaml => plan.to_yaml(),
            OutputFormat::Human => Ok(plan.to_string()),
            OutputFormat::Dockerfile => Ok(render_dockerfile(plan)),
        }
    }

    pub fn format_drift(&self, report: &DriftReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(report, "drift report"),
            OutputFormat::Yaml => to_yaml(report, "drift report"),
            OutputFormat::Human | OutputFormat::Dockerfile => Ok(format!("{}\n", report)),
        }
    }

    pub fn format_cache_keys(&self, keys: &[LayerKey]) -> Result<String> {
        match self.format {
            OutputFormat::Json => to_json(&keys, "layer cache keys"),
            OutputFormat::Yaml => to_yaml(&keys, "layer cache keys"),
            OutputFormat::Human | OutputFormat::Dockerfile => {
                let mut out = String::from("Layer Cache Keys\n================\n");
                for key in keys {
                    let _ = writeln!(
                        out,
                        "  {:>2}. {:<18} {}",
                        key.index + 1,
                        format!("{:?}", key.role),
                        &key.key[..key.key.len().min(16)]
                    );
                }
                Ok(out)
            }
        }
    }

    pub fn format_apps(&self, targets: &[AppTarget], default_target: &str) -> Result<String> {
        let names: Vec<String> = targets.iter().map(ToString::to_string).collect();
        match self.format {
            OutputFormat::Json => to_json(&names, "application list"),
            OutputFormat::Yaml => to_yaml(&names, "application list"),
            OutputFormat::Human | OutputFormat::Dockerfile => {
                let mut out = String::from("Registered Applications\n=======================\n");
                for name in &names {
                    let marker = if name == default_target { " (default)" } else { "" };
                    let _ = writeln!(out, "  {}{}", name, marker);
                }
                Ok(out)
            }
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {} to JSON", what))?;
    out.push('\n');
    Ok(out)
}

fn to_yaml<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_yaml::to_string(value).with_context(|| format!("Failed to serialize {} to YAML", what))
}
