pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{AppsArgs, CliArgs, Commands, PlanArgs, ServeArgs, VerifyArgs};
pub use output::{OutputFormat, OutputFormatter};
