//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Create context for commands
    let ctx = commands::Context {
        config_path: crate::config::resolve_path(cli.config.as_deref())?,
        output_format: cli.output.unwrap_or(OutputFormat::Pretty),
        verbose: cli.verbose,
        no_color: cli.no_color,
    };

    // Dispatch to appropriate command
    match cli.command {
        Commands::Status => commands::status::execute(ctx).await,
        Commands::Apply(args) => commands::apply::execute(ctx, args).await,
        Commands::Remove => commands::remove::execute(ctx).await,
        Commands::Profiles => commands::profiles::execute(ctx),
        Commands::Elevate(args) => commands::elevate::execute(ctx, args).await,
        Commands::Run(args) => commands::run::execute(ctx, args).await,
        Commands::Settings(args) => commands::settings::execute(ctx, args),
    }
}

/// Logs go to stderr so structured output on stdout stays clean.
fn init_logging(verbose: bool) {
    let default = if verbose {
        "netfast=debug,netfast_agent=debug,netfast_cli=debug"
    } else {
        "netfast=info,netfast_agent=info,netfast_cli=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
