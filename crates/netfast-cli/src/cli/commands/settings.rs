//! `netfast settings` - monitoring options in the config file.

use anyhow::Result;
use colored::Colorize;
use netfast_core::MonitoringConfig;

use super::Context;
use crate::cli::args::{SettingsArgs, SettingsCommands};

pub fn execute(ctx: Context, args: SettingsArgs) -> Result<()> {
    match args.command {
        SettingsCommands::Show => show_settings(&ctx),
        SettingsCommands::Set { key, value } => set_setting(&ctx, &key, value),
        SettingsCommands::Path => show_path(&ctx),
    }
}

fn show_settings(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let monitoring = config.monitoring;

    if ctx.output_format.print_structured(&monitoring)? {
        return Ok(());
    }

    println!("{}", "Monitoring Settings:".bold());
    println!();
    for (key, enabled) in entries(&monitoring) {
        let shown = if enabled {
            "on".green().to_string()
        } else {
            "off".dimmed().to_string()
        };
        println!("  {} {}", format!("{key}:").bold(), shown);
    }
    println!();
    println!(
        "  {} {}",
        "default_profile:".bold(),
        config.default_profile.cyan()
    );
    match &config.sponsor {
        Some(sponsor) => println!("  {} {} <{}>", "sponsor:".bold(), sponsor.name, sponsor.email),
        None => println!("  {} {}", "sponsor:".bold(), "(not set)".dimmed()),
    }
    Ok(())
}

fn set_setting(ctx: &Context, key: &str, value: bool) -> Result<()> {
    let mut config = ctx.load_config()?;

    if !config.monitoring.set(key, value) {
        anyhow::bail!(
            "Unknown setting: {}\n\n\
             Available settings:\n  {}",
            key,
            MonitoringConfig::KEYS.join("\n  ")
        );
    }

    crate::config::save(&config, &ctx.config_path)?;
    println!(
        "{} {} set to {}.",
        "Success:".green().bold(),
        key.cyan(),
        value
    );
    println!("  A running agent picks this up on its next config reload.");
    Ok(())
}

fn show_path(ctx: &Context) -> Result<()> {
    println!("{}", ctx.config_path.display());
    Ok(())
}

fn entries(monitoring: &MonitoringConfig) -> [(&'static str, bool); 5] {
    [
        (MonitoringConfig::KEYS[0], monitoring.auto_start_on_boot),
        (MonitoringConfig::KEYS[1], monitoring.background_service),
        (MonitoringConfig::KEYS[2], monitoring.usage_monitoring),
        (MonitoringConfig::KEYS[3], monitoring.screenshot_detection),
        (MonitoringConfig::KEYS[4], monitoring.proxy_vpn_detection),
    ]
}
