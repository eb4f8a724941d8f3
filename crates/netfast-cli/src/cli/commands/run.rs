//! `netfast run` - foreground agent.
//!
//! Starts the integrity monitor and renders escalation transitions. After a
//! warning the user picks between acknowledging it and restoring protection;
//! without a terminal the warning is acknowledged.

use anyhow::Result;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Select};
use netfast_agent::Agent;
use netfast_core::{EscalationTransition, ViolationEvent};
use std::io::IsTerminal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::Context;
use crate::cli::args::RunArgs;
use crate::output::{self, OutputFormat};

/// What the user chose after a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WarningChoice {
    Acknowledge,
    Restore,
}

pub async fn execute(ctx: Context, args: RunArgs) -> Result<()> {
    let config = ctx.load_config()?;
    let reload_every = config.reload_interval();
    let agent = ctx.agent_with(config)?;

    if let Some(profile) = &args.profile {
        let spinner = ctx.spinner(&format!("Applying {profile}..."));
        let envelope = agent.apply_filter(profile).await;
        spinner.finish_and_clear();
        let applied = output::into_result(envelope, ctx.verbose)?;
        if ctx.output_format == OutputFormat::Pretty {
            println!(
                "{} {} is filtering DNS.",
                "Success:".green().bold(),
                applied.profile.name.cyan()
            );
        }
    }

    let interactive = !args.no_prompt
        && ctx.output_format == OutputFormat::Pretty
        && std::io::stdin().is_terminal();

    let mut transitions = agent.subscribe();
    agent.start_monitoring().await;

    if ctx.output_format == OutputFormat::Pretty {
        let status = agent.check_status().await;
        if let Some(observation) = status.result {
            super::status::print_observation(&observation);
            println!();
        }
        println!(
            "{} Protection is being monitored. Press Ctrl-C to stop.",
            "NetFast:".cyan().bold()
        );
    }

    let mut reload = interval_at(Instant::now() + reload_every, reload_every);
    reload.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report_signal = ReportSignal::new()?;

    loop {
        tokio::select! {
            received = transitions.recv() => match received {
                Ok(transition) => {
                    if render_transition(&ctx, &transition)? {
                        return wait_for_exit().await;
                    }
                    if let EscalationTransition::Warned { .. } = transition {
                        respond_to_warning(&ctx, &agent, interactive).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed escalation updates"),
                Err(RecvError::Closed) => break,
            },
            _ = reload.tick() => reload_config(&ctx, &agent).await,
            () = report_signal.recv() => send_report(&ctx, &agent).await,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if agent.config().monitoring.background_service {
                    println!(
                        "{} Background service is on, so NetFast keeps running.\n  \
                         Turn it off with {} to allow stopping.",
                        "Note:".yellow().bold(),
                        "netfast settings set backgroundService false".cyan()
                    );
                    continue;
                }
                break;
            }
        }
    }

    agent.stop_monitoring().await;
    info!("monitoring stopped");
    if ctx.output_format == OutputFormat::Pretty {
        println!("{} Monitoring stopped.", "NetFast:".cyan().bold());
    }
    Ok(())
}

/// Print a transition. Returns true if the session has ended.
fn render_transition(ctx: &Context, transition: &EscalationTransition) -> Result<bool> {
    let ended = matches!(transition, EscalationTransition::Terminated { .. });
    if ctx.output_format.print_structured(transition)? {
        return Ok(ended);
    }

    match transition {
        EscalationTransition::Warned { event, status } => {
            println!();
            println!("{}", "Gentle Reminder".yellow().bold());
            println!(
                "  We noticed an attempt to change your protection ({}).",
                describe(event)
            );
            println!("  You chose this path for your growth, and we believe you can keep it.");
            println!("  {}", warning_outlook(status.remaining_warnings));
        }
        EscalationTransition::Acknowledged { status } => {
            println!(
                "  {} Warning acknowledged ({} of {} violations).",
                "Noted:".dimmed(),
                status.violation_count,
                status.max_violations
            );
        }
        EscalationTransition::Restored { profile, .. } => {
            println!(
                "{} Protection restored with {}.",
                "Success:".green().bold(),
                profile.cyan()
            );
        }
        EscalationTransition::Terminated { event, .. } => {
            println!();
            println!("{}", "Your NetFast Journey Has Ended".red().bold());
            println!(
                "  Protection was bypassed again ({}), so the filter is being removed.",
                describe(event)
            );
            println!("  When you are ready to commit again, we will be here.");
        }
    }
    Ok(ended)
}

/// What the next violation will do, given the warnings left after this one.
fn warning_outlook(remaining_warnings: u32) -> String {
    match remaining_warnings {
        0 | 1 => {
            "One more attempt to bypass protection will end your NetFast journey.".to_string()
        }
        n => format!("{n} more attempts to bypass protection will end your NetFast journey."),
    }
}

fn describe(event: &ViolationEvent) -> String {
    format!(
        "{} at {}",
        event.reason,
        event.timestamp.format("%H:%M:%S UTC")
    )
}

async fn respond_to_warning(ctx: &Context, agent: &Agent, interactive: bool) {
    let choice = if interactive {
        match prompt_after_warning().await {
            Ok(choice) => choice,
            Err(e) => {
                warn!(error = %e, "warning prompt failed");
                WarningChoice::Acknowledge
            }
        }
    } else {
        WarningChoice::Acknowledge
    };

    // The machine publishes the follow-up transition, which the loop renders
    let outcome = match choice {
        WarningChoice::Acknowledge => output::into_result(agent.acknowledge_warning(), ctx.verbose),
        WarningChoice::Restore => {
            let spinner = ctx.spinner("Restoring protection...");
            let envelope = agent.restore_protection().await;
            spinner.finish_and_clear();
            output::into_result(envelope, ctx.verbose)
        }
    };

    if let Err(e) = outcome {
        eprintln!("{} {e}", "Error:".red().bold());
    }
}

async fn prompt_after_warning() -> Result<WarningChoice> {
    let selection = tokio::task::spawn_blocking(|| {
        Select::with_theme(&ColorfulTheme::default())
            .with_prompt("What would you like to do?")
            .items(&["I Understand", "Restore My Protection"])
            .default(1)
            .interact_opt()
    })
    .await??;

    // Dismissing the prompt counts as acknowledging it
    Ok(match selection {
        Some(1) => WarningChoice::Restore,
        _ => WarningChoice::Acknowledge,
    })
}

async fn reload_config(ctx: &Context, agent: &Agent) {
    match crate::config::load(&ctx.config_path) {
        Ok(config) => {
            if agent.reload_config(config).await && ctx.output_format == OutputFormat::Pretty {
                println!("{} Monitoring settings updated.", "NetFast:".cyan().bold());
            }
        }
        Err(e) => warn!(error = %e, "config reload failed, keeping current settings"),
    }
}

async fn send_report(ctx: &Context, agent: &Agent) {
    match output::into_result(agent.send_progress_report().await, ctx.verbose) {
        Ok(Some(report)) => {
            if !matches!(ctx.output_format.print_structured(&report), Ok(true)) {
                println!(
                    "{} Progress report sent to {}.",
                    "Success:".green().bold(),
                    report.sponsor_contact.name
                );
            }
        }
        Ok(None) => println!(
            "{} No sponsor configured, so no report was sent.",
            "Note:".yellow().bold()
        ),
        Err(e) => eprintln!("{} {e}", "Error:".red().bold()),
    }
}

/// The terminator ends the process once the filter is removed.
async fn wait_for_exit() -> Result<()> {
    std::future::pending().await
}

/// SIGUSR1 asks for a progress report.
#[cfg(unix)]
struct ReportSignal(tokio::signal::unix::Signal);

#[cfg(unix)]
impl ReportSignal {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::user_defined1())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct ReportSignal;

#[cfg(not(unix))]
impl ReportSignal {
    #[allow(clippy::unnecessary_wraps)]
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netfast_core::EscalationStatus;
    use std::path::PathBuf;

    fn context(output_format: OutputFormat) -> Context {
        Context {
            config_path: PathBuf::from("config.toml"),
            output_format,
            verbose: false,
            no_color: true,
        }
    }

    #[test]
    fn test_only_termination_ends_session() {
        let ctx = context(OutputFormat::Json);
        let warned = EscalationTransition::Warned {
            event: ViolationEvent::dns_modified(),
            status: EscalationStatus::new(1, 2),
        };
        let terminated = EscalationTransition::Terminated {
            event: ViolationEvent::vpn_detected(),
            status: EscalationStatus::new(2, 2),
        };

        assert!(!render_transition(&ctx, &warned).unwrap());
        assert!(render_transition(&ctx, &terminated).unwrap());
    }

    #[test]
    fn test_last_warning_outlook() {
        // Default limit of two: the first violation warns and leaves one
        let status = EscalationStatus::new(1, 2);
        assert_eq!(status.remaining_warnings, 1);
        assert_eq!(
            warning_outlook(status.remaining_warnings),
            "One more attempt to bypass protection will end your NetFast journey."
        );
        assert_eq!(
            warning_outlook(EscalationStatus::new(1, 4).remaining_warnings),
            "3 more attempts to bypass protection will end your NetFast journey."
        );
    }

    #[test]
    fn test_pretty_rendering_of_every_transition() {
        let ctx = context(OutputFormat::Pretty);
        let status = EscalationStatus::new(0, 2);
        for transition in [
            EscalationTransition::Acknowledged { status },
            EscalationTransition::Restored {
                profile: "opendns".into(),
                status,
            },
        ] {
            assert!(!render_transition(&ctx, &transition).unwrap());
        }
    }
}
