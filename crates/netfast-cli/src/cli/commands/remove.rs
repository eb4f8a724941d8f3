//! `netfast remove` - return to automatic DNS.

use anyhow::Result;
use colored::Colorize;

use super::Context;
use crate::output;

pub async fn execute(ctx: Context) -> Result<()> {
    let agent = ctx.agent()?;

    let spinner = ctx.spinner("Removing filter...");
    let envelope = agent.remove_filter().await;
    spinner.finish_and_clear();

    let removed = output::into_result(envelope, ctx.verbose)?;

    if ctx.output_format.print_structured(&removed)? {
        return Ok(());
    }

    println!(
        "{} {} uses automatic DNS again.",
        "Success:".green().bold(),
        removed.interface.name.bold()
    );
    if !removed.observation.raw_server_list.is_empty() {
        println!(
            "  {} {}",
            "Resolvers:".bold(),
            removed.observation.raw_server_list.join(", ")
        );
    }
    Ok(())
}
