use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Launcher and image planner for containerised ASGI web services
#[derive(Parser, Debug)]
#[command(
    name = "berth",
    about = "Launcher and image planner for containerised ASGI web services",
    version,
    author,
    long_about = "berth plans reproducible container images for Poetry-managed web services \
                  and launches registered applications over HTTP with graceful shutdown \
                  and an opt-in development reload mode."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Serve an application over HTTP",
        long_about = "Resolves the application target, binds the configured address and serves \
                      until Ctrl+C or SIGTERM. Settings come from BERTH_* environment variables \
                      and are overridden by flags.\n\n\
                      Examples:\n  \
                      berth serve\n  \
                      berth serve berth.builtin:health --port 8080\n  \
                      berth serve --host 127.0.0.1 --reload --reload-dir src"
    )]
    Serve(ServeArgs),

    #[command(
        about = "Plan a container image for a Poetry project",
        long_about = "Reads pyproject.toml and poetry.lock and prints the layered image plan. \
                      Dependency layers come before the source copy so that source-only \
                      changes reuse the dependency layers.\n\n\
                      Examples:\n  \
                      berth plan\n  \
                      berth plan /path/to/project --format json\n  \
                      berth plan --app src.task_manager.main:app -o Dockerfile"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Check an installed package set against the lock",
        long_about = "Compares `pip freeze` style output with poetry.lock and reports missing, \
                      unexpected and mismatched packages. Exits non-zero on any drift.\n\n\
                      Examples:\n  \
                      pip freeze | berth verify --installed -\n  \
                      berth verify /path/to/project --installed freeze.txt"
    )]
    Verify(VerifyArgs),

    #[command(about = "List registered application targets")]
    Apps(AppsArgs),
}

#[derive(Parser, Debug, Clone, Default)]
pub struct ServeArgs {
    #[arg(
        value_name = "TARGET",
        help = "Application target as module.path:attr (defaults to BERTH_APP)"
    )]
    pub target: Option<String>,

    #[arg(long, value_name = "HOST", help = "Interface to bind")]
    pub host: Option<String>,

    #[arg(short = 'p', long, value_name = "PORT", help = "Port to bind (0 picks a free port)")]
    pub port: Option<u16>,

    #[arg(long, help = "Restart on source changes (development only)")]
    pub reload: bool,

    #[arg(
        long,
        conflicts_with = "reload",
        help = "Never restart on source changes, even if BERTH_RELOAD is set"
    )]
    pub no_reload: bool,

    #[arg(
        long = "reload-dir",
        value_name = "DIR",
        help = "Directory to watch in reload mode (repeatable)"
    )]
    pub reload_dirs: Vec<PathBuf>,

    #[arg(
        long = "reload-ext",
        value_name = "EXT",
        help = "File extension that triggers a reload (repeatable)"
    )]
    pub reload_extensions: Vec<String>,

    #[arg(long, value_name = "SECONDS", help = "Graceful shutdown timeout")]
    pub shutdown_timeout: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub project_path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "dockerfile",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(long, help = "Development image: launch command gets the reload flag")]
    pub dev: bool,

    #[arg(
        long,
        value_name = "TARGET",
        default_value = crate::image::plan::DEFAULT_IMAGE_TARGET,
        help = "Application target launched inside the image"
    )]
    pub app: String,

    #[arg(long, default_value_t = crate::image::plan::DEFAULT_IMAGE_PORT, help = "Port the image exposes")]
    pub port: u16,

    #[arg(long, value_name = "IMAGE", default_value = crate::image::plan::DEFAULT_BASE_IMAGE)]
    pub base_image: String,

    #[arg(long, value_name = "VERSION", default_value = crate::image::manager::DEFAULT_POETRY_VERSION)]
    pub manager_version: String,

    #[arg(long, value_name = "DIR", default_value = crate::image::plan::DEFAULT_WORKDIR)]
    pub workdir: String,

    #[arg(long, help = "Print per-layer cache keys instead of the plan")]
    pub cache_keys: bool,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    #[arg(value_name = "PATH", help = "Project directory (defaults to current directory)")]
    pub project_path: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Freeze listing of the installed set; '-' reads stdin"
    )]
    pub installed: PathBuf,

    #[arg(
        long,
        value_name = "PACKAGE",
        help = "Additional installed package to ignore (repeatable)"
    )]
    pub ignore: Vec<String>,

    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct AppsArgs {
    #[arg(short = 'f', long, value_enum, default_value = "human", help = "Output format")]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

impl ServeArgs {
    /// Reload setting requested on the command line, if any
    pub fn reload_override(&self) -> Option<bool> {
        match (self.reload, self.no_reload) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
            OutputFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_serve_args() {
        let args = CliArgs::parse_from(["berth", "serve"]);
        match args.command {
            Commands::Serve(serve) => {
                assert!(serve.target.is_none());
                assert!(serve.host.is_none());
                assert!(serve.port.is_none());
                assert!(!serve.reload);
                assert!(!serve.no_reload);
                assert_eq!(serve.reload_override(), None);
                assert!(serve.reload_dirs.is_empty());
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_with_overrides() {
        let args = CliArgs::parse_from([
            "berth",
            "serve",
            "src.task_manager.main:app",
            "--host",
            "127.0.0.1",
            "-p",
            "9000",
            "--reload",
            "--reload-dir",
            "src",
            "--reload-dir",
            "templates",
            "--reload-ext",
            "py",
        ]);
        match args.command {
            Commands::Serve(serve) => {
                assert_eq!(serve.target.as_deref(), Some("src.task_manager.main:app"));
                assert_eq!(serve.host.as_deref(), Some("127.0.0.1"));
                assert_eq!(serve.port, Some(9000));
                assert!(serve.reload);
                assert_eq!(serve.reload_override(), Some(true));
                assert_eq!(
                    serve.reload_dirs,
                    vec![PathBuf::from("src"), PathBuf::from("templates")]
                );
                assert_eq!(serve.reload_extensions, vec!["py".to_string()]);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_no_reload() {
        let args = CliArgs::parse_from(["berth", "serve", "--no-reload"]);
        match args.command {
            Commands::Serve(serve) => assert_eq!(serve.reload_override(), Some(false)),
            _ => panic!("Expected Serve command"),
        }

        assert!(CliArgs::try_parse_from(["berth", "serve", "--reload", "--no-reload"]).is_err());
    }

    #[test]
    fn test_default_plan_args() {
        let args = CliArgs::parse_from(["berth", "plan"]);
        match args.command {
            Commands::Plan(plan) => {
                assert_eq!(plan.format, OutputFormatArg::Dockerfile);
                assert!(!plan.dev);
                assert_eq!(plan.app, "main:app");
                assert_eq!(plan.port, 8000);
                assert_eq!(plan.base_image, "python:3.11-slim");
                assert_eq!(plan.manager_version, "1.8.3");
                assert_eq!(plan.workdir, "/app");
                assert!(!plan.cache_keys);
                assert!(plan.project_path.is_none());
            }
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_plan_with_path_and_format() {
        let args = CliArgs::parse_from(["berth", "plan", "/tmp/project", "--format", "json", "--dev"]);
        match args.command {
            Commands::Plan(plan) => {
                assert_eq!(plan.project_path, Some(PathBuf::from("/tmp/project")));
                assert_eq!(plan.format, OutputFormatArg::Json);
                assert!(plan.dev);
            }
            _ => panic!("Expected Plan command"),
        }
    }

    #[test]
    fn test_verify_requires_installed() {
        assert!(CliArgs::try_parse_from(["berth", "verify"]).is_err());

        let args = CliArgs::parse_from(["berth", "verify", "--installed", "-", "--ignore", "gunicorn"]);
        match args.command {
            Commands::Verify(verify) => {
                assert_eq!(verify.installed, PathBuf::from("-"));
                assert_eq!(verify.ignore, vec!["gunicorn".to_string()]);
                assert_eq!(verify.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Verify command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["berth", "apps", "--log-level", "debug", "--log-json"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.log_json);
        assert!(CliArgs::try_parse_from(["berth", "apps", "-v", "-q"]).is_err());
    }
}
