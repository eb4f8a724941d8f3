//! Command implementations.

pub mod apply;
pub mod elevate;
pub mod profiles;
pub mod remove;
pub mod run;
pub mod settings;
pub mod status;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use netfast_agent::{Agent, AgentConfig, Autostart, CommandRunner, Platform, SystemRunner};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::output::OutputFormat;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Config file in use
    pub config_path: PathBuf,

    /// Output format
    pub output_format: OutputFormat,

    /// Verbose output
    pub verbose: bool,

    /// Disable colors
    pub no_color: bool,
}

impl Context {
    /// Load the config file.
    pub fn load_config(&self) -> Result<AgentConfig> {
        crate::config::load(&self.config_path)
    }

    /// Build an agent from the config file.
    pub fn agent(&self) -> Result<Agent> {
        self.agent_with(self.load_config()?)
    }

    /// Build an agent from `config`, wired to the real host.
    pub fn agent_with(&self, config: AgentConfig) -> Result<Agent> {
        let platform = Platform::current();
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(config.command_timeout()));

        let mut builder = Agent::builder(config)
            .platform(platform.clone())
            .runner(Arc::clone(&runner));

        match Autostart::for_current_user(platform, runner) {
            Ok(autostart) => builder = builder.autostart(autostart),
            Err(e) => tracing::warn!(error = %e, "login start unavailable"),
        }

        Ok(builder.build()?)
    }

    /// Spinner for slow operations; hidden for machine-readable output.
    pub fn spinner(&self, message: &str) -> ProgressBar {
        if self.output_format != OutputFormat::Pretty {
            return ProgressBar::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}
