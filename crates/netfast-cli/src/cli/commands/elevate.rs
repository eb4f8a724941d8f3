//! `netfast elevate` - administrator rights check and re-launch.

use anyhow::{bail, Context as _, Result};
use colored::Colorize;
use tracing::info;

use super::Context;
use crate::cli::args::ElevateArgs;
use crate::output::{self, OutputFormat};

pub async fn execute(ctx: Context, args: ElevateArgs) -> Result<()> {
    let agent = ctx.agent()?;
    let status = output::into_result(agent.request_elevated_privileges().await, ctx.verbose)?;

    if args.command.is_empty() {
        if ctx.output_format.print_structured(&status)? {
            return Ok(());
        }
        report(&status, agent.platform());
        return Ok(());
    }

    let exe = std::env::current_exe().context("cannot locate the netfast executable")?;
    let forwarded = relaunch_args(&ctx, &args.command);
    let spec = if status.elevated {
        netfast_agent::CommandSpec::new(exe.to_string_lossy(), forwarded)
    } else {
        agent.platform().elevated_relaunch(&exe, &forwarded)?
    };

    if ctx.output_format == OutputFormat::Pretty && !status.elevated {
        println!(
            "{} Asking for administrator rights to run {}.",
            "NetFast:".cyan().bold(),
            args.command.join(" ").cyan()
        );
    }
    info!(command = %spec, elevated = status.elevated, "re-launching");

    // Inherit the terminal so sudo can prompt for a password
    let exit = tokio::process::Command::new(&spec.program)
        .args(&spec.args)
        .status()
        .await
        .with_context(|| format!("failed to start {}", spec.program))?;

    if !exit.success() {
        bail!("elevated command exited with {exit}");
    }
    Ok(())
}

fn report(status: &netfast_agent::ElevationStatus, platform: &netfast_agent::Platform) {
    if status.elevated {
        println!(
            "{} Running with administrator rights.",
            "Success:".green().bold()
        );
        return;
    }

    println!(
        "{} Not running with administrator rights.",
        "Warning:".yellow().bold()
    );
    let how = match platform {
        netfast_agent::Platform::Windows => "the Windows consent prompt",
        _ => "sudo",
    };
    println!(
        "  Run {} to re-launch a command through {how}.",
        "netfast elevate -- <command>".cyan()
    );
}

/// Arguments for the re-launched process. The config file and verbosity
/// carry over explicitly since sudo drops the environment.
fn relaunch_args(ctx: &Context, command: &[String]) -> Vec<String> {
    let mut args = vec![
        "--config".to_string(),
        ctx.config_path.to_string_lossy().into_owned(),
    ];
    if ctx.verbose {
        args.push("--verbose".to_string());
    }
    if ctx.no_color {
        args.push("--no-color".to_string());
    }
    args.extend(command.iter().cloned());
    args
}
