use berth::builtin::default_registry;
use berth::cli::commands::{CliArgs, Commands};
use berth::cli::handlers::{handle_apps, handle_plan, handle_serve, handle_verify};
use berth::util::logging::{self, LoggingConfig};
use berth::{exit, RuntimeEnv, VERSION};

use clap::Parser;
use tracing::{debug, error, Level};

fn main() {
    let args = CliArgs::parse();

    // Environment writes are only sound before any other thread exists
    let runtime_env = RuntimeEnv::export_defaults();

    init_logging_from_args(&args);
    debug!("berth v{} starting", VERSION);
    debug!("Arguments: {:?}", args);
    debug!("Runtime environment: {:?}", runtime_env);

    let exit_code = match &args.command {
        Commands::Plan(plan_args) => handle_plan(plan_args),
        Commands::Verify(verify_args) => handle_verify(verify_args),
        Commands::Apps(apps_args) => match default_registry() {
            Ok(registry) => handle_apps(apps_args, &registry),
            Err(e) => {
                error!("{}", e);
                e.exit_code()
            }
        },
        Commands::Serve(serve_args) => {
            let registry = match default_registry() {
                Ok(registry) => registry,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(e.exit_code());
                }
            };
            match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(handle_serve(serve_args, registry)),
                Err(e) => {
                    error!("Failed to start async runtime: {}", e);
                    exit::FAILURE
                }
            }
        }
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = LoggingConfig::from_env();

    if let Some(level_str) = &args.log_level {
        config.level = logging::parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }
    if args.log_json {
        config.use_json = true;
    }

    logging::init_logging(config);
}
