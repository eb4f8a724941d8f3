//! Command plans for reading and writing resolver settings.
//!
//! Each platform has a native path and a fallback path. A plan is the ordered
//! list of commands one attempt runs; the controller decides what to do when
//! a plan fails.

use netfast_core::{AddressFamily, FilterError, FilterProfile, Result};
use serde::Serialize;
use std::net::IpAddr;

use super::interface::ActiveInterface;
use crate::exec::CommandSpec;
use crate::platform::Platform;

/// Which tool family an attempt uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandPath {
    /// netsh, networksetup, resolvectl
    Native,
    /// PowerShell, AppleScript elevation, NetworkManager
    Fallback,
}

impl CommandPath {
    /// Attempt order
    pub const ALL: [Self; 2] = [Self::Native, Self::Fallback];
}

impl std::fmt::Display for CommandPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

fn unsupported(platform: &Platform) -> FilterError {
    FilterError::Unsupported {
        platform: platform.to_string(),
    }
}

/// Commands that point `iface` at the profile's resolvers.
///
/// Only families the interface has and the profile defines are written.
pub fn set_servers(
    platform: &Platform,
    path: CommandPath,
    iface: &ActiveInterface,
    profile: &FilterProfile,
) -> Result<Vec<CommandSpec>> {
    let families: Vec<(AddressFamily, Vec<IpAddr>)> = iface
        .families
        .iter()
        .map(|&family| (family, profile.addresses_for(family).copied().collect::<Vec<_>>()))
        .filter(|(_, addrs)| !addrs.is_empty())
        .collect();

    if families.is_empty() {
        return Err(FilterError::ExecutionFailed(format!(
            "profile {} has no resolvers for the address families on {}",
            profile.name, iface.name
        )));
    }

    match (platform, path) {
        (Platform::Windows, CommandPath::Native) => Ok(families
            .iter()
            .flat_map(|(family, addrs)| netsh_set(&iface.name, *family, addrs))
            .collect()),
        (Platform::Windows, CommandPath::Fallback) => {
            let list = families
                .iter()
                .flat_map(|(_, addrs)| addrs.iter())
                .map(|a| format!("'{a}'"))
                .collect::<Vec<_>>()
                .join(",");
            Ok(vec![powershell(&format!(
                "Set-DnsClientServerAddress -InterfaceAlias {} -ServerAddresses ({list})",
                ps_quote(&iface.name)
            ))])
        }
        (Platform::MacOs, path) => {
            let mut args = vec!["-setdnsservers".to_string(), iface.name.clone()];
            args.extend(
                families
                    .iter()
                    .flat_map(|(_, addrs)| addrs.iter().map(ToString::to_string)),
            );
            Ok(vec![networksetup(path, args)])
        }
        (Platform::Linux, CommandPath::Native) => {
            let mut args = vec!["dns".to_string(), iface.device.clone()];
            args.extend(
                families
                    .iter()
                    .flat_map(|(_, addrs)| addrs.iter().map(ToString::to_string)),
            );
            Ok(vec![CommandSpec::new("resolvectl", args)])
        }
        (Platform::Linux, CommandPath::Fallback) => Ok(families
            .iter()
            .map(|(family, addrs)| {
                let list = addrs
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                nmcli_modify(&iface.device, *family, &list, "yes")
            })
            .collect()),
        (other, _) => Err(unsupported(other)),
    }
}

/// Commands that hand resolver selection back to DHCP / automatic.
pub fn reset_servers(
    platform: &Platform,
    path: CommandPath,
    iface: &ActiveInterface,
) -> Result<Vec<CommandSpec>> {
    match (platform, path) {
        (Platform::Windows, CommandPath::Native) => Ok(iface
            .families
            .iter()
            .map(|family| {
                CommandSpec::new(
                    "netsh",
                    vec![
                        "interface".to_string(),
                        family.to_string(),
                        "set".to_string(),
                        "dnsservers".to_string(),
                        format!("name={}", iface.name),
                        "source=dhcp".to_string(),
                    ],
                )
            })
            .collect()),
        (Platform::Windows, CommandPath::Fallback) => Ok(vec![powershell(&format!(
            "Set-DnsClientServerAddress -InterfaceAlias {} -ResetServerAddresses",
            ps_quote(&iface.name)
        ))]),
        (Platform::MacOs, path) => Ok(vec![networksetup(
            path,
            vec![
                "-setdnsservers".to_string(),
                iface.name.clone(),
                "Empty".to_string(),
            ],
        )]),
        (Platform::Linux, CommandPath::Native) => Ok(vec![CommandSpec::new(
            "resolvectl",
            ["revert", iface.device.as_str()],
        )]),
        (Platform::Linux, CommandPath::Fallback) => Ok(iface
            .families
            .iter()
            .map(|family| nmcli_modify(&iface.device, *family, "", "no"))
            .collect()),
        (other, _) => Err(unsupported(other)),
    }
}

/// Commands that read the live resolver list.
///
/// Output of every command that succeeds is concatenated before matching.
pub fn read_servers(platform: &Platform, path: CommandPath) -> Result<Vec<CommandSpec>> {
    match (platform, path) {
        (Platform::Windows, CommandPath::Native) => Ok(vec![
            CommandSpec::new("netsh", ["interface", "ipv4", "show", "dnsservers"]),
            CommandSpec::new("netsh", ["interface", "ipv6", "show", "dnsservers"]),
        ]),
        (Platform::Windows, CommandPath::Fallback) => Ok(vec![powershell(
            "Get-DnsClientServerAddress | Select-Object -ExpandProperty ServerAddresses",
        )]),
        (Platform::MacOs, CommandPath::Native) => Ok(vec![CommandSpec::new("scutil", ["--dns"])]),
        (Platform::Linux, CommandPath::Native) => Ok(vec![CommandSpec::new("resolvectl", ["dns"])]),
        (Platform::MacOs | Platform::Linux, CommandPath::Fallback) => {
            Ok(vec![CommandSpec::new("cat", ["/etc/resolv.conf"])])
        }
        (other, _) => Err(unsupported(other)),
    }
}

/// Commands that drop cached answers. Failures here are not fatal.
pub fn flush_cache(platform: &Platform) -> Result<Vec<CommandSpec>> {
    match platform {
        Platform::Windows => Ok(vec![CommandSpec::new("ipconfig", ["/flushdns"])]),
        Platform::MacOs => Ok(vec![
            CommandSpec::new("dscacheutil", ["-flushcache"]),
            CommandSpec::new("killall", ["-HUP", "mDNSResponder"]),
        ]),
        Platform::Linux => Ok(vec![CommandSpec::new("resolvectl", ["flush-caches"])]),
        other => Err(unsupported(other)),
    }
}

fn netsh_set(name: &str, family: AddressFamily, addrs: &[IpAddr]) -> Vec<CommandSpec> {
    let mut commands = Vec::with_capacity(addrs.len());
    let mut iter = addrs.iter();

    // "set" replaces the whole list, "add" appends after it
    if let Some(primary) = iter.next() {
        commands.push(CommandSpec::new(
            "netsh",
            vec![
                "interface".to_string(),
                family.to_string(),
                "set".to_string(),
                "dnsservers".to_string(),
                format!("name={name}"),
                "static".to_string(),
                primary.to_string(),
                "primary".to_string(),
                "validate=no".to_string(),
            ],
        ));
    }
    for (offset, addr) in iter.enumerate() {
        commands.push(CommandSpec::new(
            "netsh",
            vec![
                "interface".to_string(),
                family.to_string(),
                "add".to_string(),
                "dnsservers".to_string(),
                format!("name={name}"),
                addr.to_string(),
                format!("index={}", offset + 2),
                "validate=no".to_string(),
            ],
        ));
    }

    commands
}

pub(crate) fn powershell(script: &str) -> CommandSpec {
    CommandSpec::new(
        "powershell",
        ["-NoProfile", "-NonInteractive", "-Command", script],
    )
}

pub(crate) fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn networksetup(path: CommandPath, args: Vec<String>) -> CommandSpec {
    match path {
        CommandPath::Native => CommandSpec::new("networksetup", args),
        CommandPath::Fallback => {
            // Re-run through AppleScript so macOS shows its own password prompt
            let line = args
                .iter()
                .map(|a| format!("'{}'", a.replace('\'', "'\\''")))
                .collect::<Vec<_>>()
                .join(" ");
            let script = format!(
                "do shell script \"/usr/sbin/networksetup {}\" with administrator privileges",
                line.replace('\\', "\\\\").replace('"', "\\\"")
            );
            CommandSpec::new("osascript", ["-e", script.as_str()])
        }
    }
}

fn nmcli_modify(device: &str, family: AddressFamily, list: &str, ignore_auto: &str) -> CommandSpec {
    CommandSpec::new(
        "nmcli",
        vec![
            "device".to_string(),
            "modify".to_string(),
            device.to_string(),
            format!("{family}.dns"),
            list.to_string(),
            format!("{family}.ignore-auto-dns"),
            ignore_auto.to_string(),
        ],
    )
}
