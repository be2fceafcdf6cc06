//! Dockerfile rendering

use super::plan::{ImagePlan, LayerRole};

/// Renders a plan as Dockerfile text.
///
/// A blank line separates the dependency layers from the source layers so the
/// cache boundary is visible when reading the file.
pub fn render_dockerfile(plan: &ImagePlan) -> String {
    let mut out = String::new();
    out.push_str("# syntax=docker/dockerfile:1\n");
    match plan.project {
        Some(ref project) => out.push_str(&format!("# {} - generated by berth\n", project)),
        None => out.push_str("# generated by berth\n"),
    }

    let mut previous: Option<LayerRole> = None;
    for step in &plan.steps {
        let boundary = matches!(
            (previous, step.role),
            (Some(LayerRole::Base), _)
                | (Some(_), LayerRole::ManagerInstall)
                | (Some(_), LayerRole::ManifestCopy)
                | (Some(_), LayerRole::SourceCopy)
                | (Some(_), LayerRole::Expose)
        );
        if boundary {
            out.push('\n');
        }
        out.push_str(&step.instruction.to_string());
        out.push('\n');
        previous = Some(step.role);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{PlanOptions, PoetryManager, ProjectSources};
    use crate::manifest::{LockFile, Manifest};
    use std::path::PathBuf;

    fn plan(dev_mode: bool) -> ImagePlan {
        let sources = ProjectSources {
            root: PathBuf::from("."),
            manifest: Manifest::parse(
                "[tool.poetry]\nname = \"task-manager\"\nreadme = \"README.md\"\n",
            )
            .unwrap(),
            lock: LockFile::default(),
        };
        let options = PlanOptions {
            app_target: "src.task_manager.main:app".to_string(),
            dev_mode,
            ..Default::default()
        };
        ImagePlan::build(&sources, &PoetryManager::default(), &options).unwrap()
    }

    #[test]
    fn test_render_dockerfile() {
        let expected = "\
# syntax=docker/dockerfile:1
# task-manager - generated by berth
FROM python:3.11-slim

ENV PYTHONUNBUFFERED=1 PYTHONDONTWRITEBYTECODE=1
WORKDIR /app

RUN pip install --no-cache-dir poetry==1.8.3
RUN poetry config virtualenvs.create false

COPY pyproject.toml poetry.lock README.md ./
RUN poetry install --no-root --no-interaction --no-ansi

COPY . .

EXPOSE 8000
CMD [\"uvicorn\", \"src.task_manager.main:app\", \"--host\", \"0.0.0.0\", \"--port\", \"8000\"]
";
        assert_eq!(render_dockerfile(&plan(false)), expected);
    }

    #[test]
    fn test_render_dev_dockerfile_reloads() {
        let text = render_dockerfile(&plan(true));
        assert!(text.contains("\"--reload\"]"));
    }
}
