//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Keep DNS resolution pinned to a filtering provider
///
/// Applies a family-safe resolver, watches for tampering and VPN tunnels,
/// and keeps your accountability sponsor in the loop.
///
/// Changing DNS settings needs administrator rights.
#[derive(Parser, Debug)]
#[command(name = "netfast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: platform config dir)
    #[arg(short, long, env = "NETFAST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the resolvers in use and whether they are filtered
    Status,

    /// Apply a filtering provider
    Apply(ApplyArgs),

    /// Remove the filter and return to automatic DNS
    Remove,

    /// List the available filtering providers
    Profiles,

    /// Check for administrator rights, or re-run a command with them
    ///
    /// `netfast elevate -- apply opendns` re-launches through sudo, or the
    /// Windows consent prompt, when this process is not elevated.
    Elevate(ElevateArgs),

    /// Run the agent in the foreground
    ///
    /// On Unix, SIGUSR1 sends your sponsor a progress report.
    Run(RunArgs),

    /// Manage monitoring settings
    Settings(SettingsArgs),
}

// ============================================================================
// Apply command
// ============================================================================

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Provider name (see `netfast profiles`)
    pub provider: String,
}

// ============================================================================
// Elevate command
// ============================================================================

#[derive(Args, Debug)]
pub struct ElevateArgs {
    /// netfast command to re-run with administrator rights
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

// ============================================================================
// Run command
// ============================================================================

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Apply this provider before monitoring starts
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Never prompt after a warning; log it and keep going
    #[arg(long)]
    pub no_prompt: bool,
}

// ============================================================================
// Settings command
// ============================================================================

#[derive(Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommands,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show monitoring settings
    Show,

    /// Turn a monitoring option on or off
    Set {
        /// Option name (e.g. usageMonitoring)
        key: String,
        /// true or false
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Show config file path
    Path,
}
