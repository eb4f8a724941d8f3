//! `netfast apply` - switch to a filtering provider.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::cli::args::ApplyArgs;
use crate::output;

pub async fn execute(ctx: Context, args: ApplyArgs) -> Result<()> {
    let agent = ctx.agent()?;

    let spinner = ctx.spinner(&format!("Applying {}...", args.provider));
    let envelope = agent.apply_filter(&args.provider).await;
    spinner.finish_and_clear();

    let applied = output::into_result(envelope, ctx.verbose)?;

    if ctx.output_format.print_structured(&applied)? {
        return Ok(());
    }

    println!(
        "{} {} is now filtering DNS on {}.",
        "Success:".green().bold(),
        applied.profile.name.cyan(),
        applied.interface.name.bold()
    );
    println!(
        "  {} {}",
        "Resolvers:".bold(),
        applied.observation.raw_server_list.join(", ")
    );
    if ctx.verbose {
        println!("  {} {}", "Command path:".bold(), applied.path);
    }
    Ok(())
}
