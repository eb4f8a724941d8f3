//! Active network interface discovery.

use netfast_core::{AddressFamily, FilterError, Result};
use serde::Serialize;
use tracing::debug;

use crate::exec::{CommandRunner, CommandSpec};
use crate::platform::Platform;

/// The interface that carries the default route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveInterface {
    /// Name the configuration tool expects (Windows alias, macOS service name,
    /// Linux device)
    pub name: String,

    /// Kernel device name (`eth0`, `en0`); same as `name` on Windows
    pub device: String,

    /// Families with a default route through this interface
    pub families: Vec<AddressFamily>,
}

/// Choose the interface from per-family candidate lists.
///
/// An interface present in both lists wins; otherwise the first IPv4
/// candidate, then the first IPv6 candidate.
#[must_use]
pub fn pick_interface(v4: &[String], v6: &[String]) -> Option<(String, Vec<AddressFamily>)> {
    if let Some(both) = v4.iter().find(|name| v6.contains(name)) {
        return Some((both.clone(), vec![AddressFamily::V4, AddressFamily::V6]));
    }
    if let Some(first) = v4.first() {
        return Some((first.clone(), vec![AddressFamily::V4]));
    }
    v6.first()
        .map(|first| (first.clone(), vec![AddressFamily::V6]))
}

/// Find the active interface on this platform.
pub async fn resolve(runner: &dyn CommandRunner, platform: &Platform) -> Result<ActiveInterface> {
    platform.ensure_supported()?;

    let (v4, v6) = match platform {
        Platform::Linux => (
            linux_default_devices(runner, AddressFamily::V4).await,
            linux_default_devices(runner, AddressFamily::V6).await,
        ),
        Platform::MacOs => (
            macos_default_devices(runner, AddressFamily::V4).await,
            macos_default_devices(runner, AddressFamily::V6).await,
        ),
        Platform::Windows => windows_connected(runner).await?,
        Platform::Other(_) => (Vec::new(), Vec::new()),
    };
    debug!(?v4, ?v6, "default route candidates");

    let (device, families) = pick_interface(&v4, &v6).ok_or_else(|| {
        FilterError::ExecutionFailed("could not determine active network interface".to_string())
    })?;

    let name = match platform {
        Platform::MacOs => macos_service_for(runner, &device).await?,
        _ => device.clone(),
    };

    Ok(ActiveInterface {
        name,
        device,
        families,
    })
}

async fn linux_default_devices(runner: &dyn CommandRunner, family: AddressFamily) -> Vec<String> {
    let flag = match family {
        AddressFamily::V4 => "-4",
        AddressFamily::V6 => "-6",
    };
    let spec = CommandSpec::new("ip", ["-o", flag, "route", "show", "default"]);
    match runner.run(&spec).await {
        Ok(out) => parse_ip_route(&out),
        Err(e) => {
            debug!(error = %e, "no {family} default route");
            Vec::new()
        }
    }
}

/// Device names from `ip -o route show default`
#[must_use]
pub fn parse_ip_route(output: &str) -> Vec<String> {
    let mut devices = Vec::new();
    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token == "dev" {
                if let Some(dev) = tokens.next() {
                    if !devices.iter().any(|d| d == dev) {
                        devices.push(dev.to_string());
                    }
                }
                break;
            }
        }
    }
    devices
}

async fn macos_default_devices(runner: &dyn CommandRunner, family: AddressFamily) -> Vec<String> {
    let spec = match family {
        AddressFamily::V4 => CommandSpec::new("route", ["-n", "get", "default"]),
        AddressFamily::V6 => CommandSpec::new("route", ["-n", "get", "-inet6", "default"]),
    };
    match runner.run(&spec).await {
        Ok(out) => parse_route_get(&out).into_iter().collect(),
        Err(e) => {
            debug!(error = %e, "no {family} default route");
            Vec::new()
        }
    }
}

/// Device from the `interface:` line of `route -n get default`
#[must_use]
pub fn parse_route_get(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("interface:")
            .map(|dev| dev.trim().to_string())
            .filter(|dev| !dev.is_empty())
    })
}

async fn macos_service_for(runner: &dyn CommandRunner, device: &str) -> Result<String> {
    let out = runner
        .run(&CommandSpec::new("networksetup", ["-listnetworkserviceorder"]))
        .await?;
    parse_service_order(&out, device).ok_or_else(|| {
        FilterError::ExecutionFailed(format!("no network service uses device {device}"))
    })
}

/// Map a device to its service name in `networksetup -listnetworkserviceorder`.
///
/// ```text
/// (1) Wi-Fi
/// (Hardware Port: Wi-Fi, Device: en0)
/// ```
#[must_use]
pub fn parse_service_order(output: &str, device: &str) -> Option<String> {
    let mut current: Option<String> = None;
    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("(Hardware Port:") {
            let dev = rest
                .split("Device:")
                .nth(1)
                .map(|d| d.trim().trim_end_matches(')').trim());
            if dev == Some(device) {
                return current;
            }
        } else if line.starts_with('(') {
            // "(1) Wi-Fi" or "(*) Disabled Service"
            current = line
                .split_once(')')
                .map(|(_, name)| name.trim().to_string())
                .filter(|name| !name.is_empty());
        }
    }
    None
}

async fn windows_connected(runner: &dyn CommandRunner) -> Result<(Vec<String>, Vec<String>)> {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    let mut last_err = None;

    for family in [AddressFamily::V4, AddressFamily::V6] {
        let spec = CommandSpec::new(
            "netsh",
            vec![
                "interface".to_string(),
                family.to_string(),
                "show".to_string(),
                "interfaces".to_string(),
            ],
        );
        match runner.run(&spec).await {
            Ok(out) => {
                let names = parse_netsh_interfaces(&out);
                match family {
                    AddressFamily::V4 => v4 = names,
                    AddressFamily::V6 => v6 = names,
                }
            }
            Err(e) => last_err = Some(e),
        }
    }

    if v4.is_empty() && v6.is_empty() {
        // Older builds lack the per-family listing
        let out = runner
            .run(&CommandSpec::new("netsh", ["interface", "show", "interface"]))
            .await;
        match out {
            Ok(out) => v4 = parse_netsh_show_interface(&out),
            Err(e) => return Err(last_err.unwrap_or(e)),
        }
    }

    Ok((v4, v6))
}

/// Connected interface aliases from `netsh interface ipv4 show interfaces`.
///
/// ```text
/// Idx     Met         MTU          State                Name
/// ---  ----------  ----------  ------------  ---------------------------
///   1          75  4294967295  connected     Loopback Pseudo-Interface 1
///  12          25        1500  connected     Wi-Fi
/// ```
#[must_use]
pub fn parse_netsh_interfaces(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 5 || tokens[0].parse::<u32>().is_err() {
                return None;
            }
            if !tokens[3].eq_ignore_ascii_case("connected") {
                return None;
            }
            let name = tokens[4..].join(" ");
            (!name.starts_with("Loopback")).then_some(name)
        })
        .collect()
}

/// Connected interface names from `netsh interface show interface`.
///
/// ```text
/// Admin State    State          Type             Interface Name
/// -------------------------------------------------------------------------
/// Enabled        Connected      Dedicated        Ethernet 2
/// ```
#[must_use]
pub fn parse_netsh_show_interface(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 4 || !tokens[1].eq_ignore_ascii_case("connected") {
                return None;
            }
            Some(tokens[3..].join(" "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_pick_prefers_dual_stack() {
        let (name, families) =
            pick_interface(&names(&["wlan0", "eth0"]), &names(&["eth0"])).unwrap();
        assert_eq!(name, "eth0");
        assert_eq!(families, vec![AddressFamily::V4, AddressFamily::V6]);
    }

    #[test]
    fn test_pick_falls_back_by_family() {
        let (name, families) = pick_interface(&names(&["wlan0"]), &names(&["eth1"])).unwrap();
        assert_eq!(name, "wlan0");
        assert_eq!(families, vec![AddressFamily::V4]);

        let (name, families) = pick_interface(&[], &names(&["eth1"])).unwrap();
        assert_eq!(name, "eth1");
        assert_eq!(families, vec![AddressFamily::V6]);

        assert!(pick_interface(&[], &[]).is_none());
    }

    #[test]
    fn test_parse_ip_route() {
        let out = "default via 192.168.1.1 dev wlp3s0 proto dhcp metric 600\n\
                   default via 10.0.0.1 dev eth0 proto static metric 100\n";
        assert_eq!(parse_ip_route(out), names(&["wlp3s0", "eth0"]));
        assert!(parse_ip_route("").is_empty());
    }

    #[test]
    fn test_parse_route_get() {
        let out = "   route to: default\ndestination: default\n    gateway: 192.168.1.1\n  interface: en0\n";
        assert_eq!(parse_route_get(out).as_deref(), Some("en0"));
        assert!(parse_route_get("route: writing to routing socket: not in table").is_none());
    }

    #[test]
    fn test_parse_service_order() {
        let out = "An asterisk (*) denotes that a network service is disabled.\n\
                   (1) USB 10/100/1000 LAN\n\
                   (Hardware Port: USB 10/100/1000 LAN, Device: en7)\n\
                   \n\
                   (2) Wi-Fi\n\
                   (Hardware Port: Wi-Fi, Device: en0)\n";
        assert_eq!(parse_service_order(out, "en0").as_deref(), Some("Wi-Fi"));
        assert_eq!(
            parse_service_order(out, "en7").as_deref(),
            Some("USB 10/100/1000 LAN")
        );
        assert!(parse_service_order(out, "en9").is_none());
    }

    #[test]
    fn test_parse_netsh_interfaces() {
        let out = "\r\nIdx     Met         MTU          State                Name\r\n\
                   ---  ----------  ----------  ------------  ---------------------------\r\n  \
                   1          75  4294967295  connected     Loopback Pseudo-Interface 1\r\n \
                   12          25        1500  connected     Wi-Fi\r\n  \
                   7           5        1500  disconnected  Ethernet 2\r\n";
        assert_eq!(parse_netsh_interfaces(out), names(&["Wi-Fi"]));
    }

    #[test]
    fn test_parse_netsh_show_interface() {
        let out = "\r\nAdmin State    State          Type             Interface Name\r\n\
                   -------------------------------------------------------------------------\r\n\
                   Enabled        Connected      Dedicated        Ethernet 2\r\n\
                   Enabled        Disconnected   Dedicated        Wi-Fi\r\n";
        assert_eq!(parse_netsh_show_interface(out), names(&["Ethernet 2"]));
    }
}
