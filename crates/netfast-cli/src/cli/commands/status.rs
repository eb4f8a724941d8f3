//! `netfast status` - current resolver state.

use anyhow::Result;
use colored::Colorize;
use netfast_core::DnsObservation;

use super::Context;
use crate::output;

pub async fn execute(ctx: Context) -> Result<()> {
    let agent = ctx.agent()?;
    let observation = output::into_result(agent.check_status().await, ctx.verbose)?;
    let escalation = output::into_result(agent.get_escalation_status(), ctx.verbose)?;

    if ctx.output_format.print_structured(&observation)? {
        return Ok(());
    }

    print_observation(&observation);
    println!(
        "  {} {} of {}",
        "Violations:".bold(),
        escalation.violation_count,
        escalation.max_violations
    );
    Ok(())
}

/// Render an observation for humans.
pub fn print_observation(observation: &DnsObservation) {
    println!("{}", "DNS Filter Status".bold());
    println!();

    if let Some(error) = &observation.read_error {
        println!("  {} {}", "State:".bold(), "unknown".yellow());
        println!("  {} {}", "Read error:".bold(), error.dimmed());
    } else if observation.is_filtered {
        println!("  {} {}", "State:".bold(), "filtered".green().bold());
    } else {
        println!("  {} {}", "State:".bold(), "unfiltered".red().bold());
    }

    match &observation.matched_profile {
        Some(profile) => println!(
            "  {} {} ({})",
            "Provider:".bold(),
            profile.name.cyan(),
            profile.description
        ),
        None => println!("  {} {}", "Provider:".bold(), "none".dimmed()),
    }

    if let Some(last) = &observation.last_known_filter {
        println!("  {} {}", "Last applied:".bold(), last);
    }

    let servers = if observation.raw_server_list.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        observation.raw_server_list.join(", ")
    };
    println!("  {} {}", "Resolvers:".bold(), servers);
    println!(
        "  {} {}",
        "Checked:".bold(),
        observation.observed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}
