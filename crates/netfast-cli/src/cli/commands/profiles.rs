//! `netfast profiles` - built-in filtering providers.

use anyhow::Result;
use colored::Colorize;
use netfast_core::{AddressFamily, FilterProfile, ProfileTable};
use tabled::{settings::Style, Table, Tabled};

use super::Context;

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "IPv4")]
    ipv4: String,
    #[tabled(rename = "IPv6")]
    ipv6: String,
}

impl From<&FilterProfile> for ProfileRow {
    fn from(profile: &FilterProfile) -> Self {
        let join = |family: AddressFamily| {
            let list: Vec<String> = profile
                .addresses_for(family)
                .map(ToString::to_string)
                .collect();
            if list.is_empty() {
                "-".to_string()
            } else {
                list.join(", ")
            }
        };
        Self {
            name: profile.name.clone(),
            description: profile.description.clone(),
            ipv4: join(AddressFamily::V4),
            ipv6: join(AddressFamily::V6),
        }
    }
}

pub fn execute(ctx: Context) -> Result<()> {
    let table = ProfileTable::builtin();
    let profiles: Vec<&FilterProfile> = table.iter().collect();

    if ctx.output_format.print_structured(&profiles)? {
        return Ok(());
    }

    println!("{}", "Filtering Providers".bold());
    println!();
    let rows: Vec<ProfileRow> = profiles.into_iter().map(ProfileRow::from).collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    println!();
    println!("Apply one with {}", "netfast apply <name>".cyan());
    Ok(())
}
