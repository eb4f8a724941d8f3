//! Host probes for the integrity monitor: tunnel interfaces and running browsers.

use async_trait::async_trait;
use netfast_core::{FilterError, Result};
use std::sync::Arc;
use tracing::debug;

use crate::exec::{CommandRunner, CommandSpec};
use crate::platform::Platform;

/// Interface name prefixes that indicate a tunnel on Unix
const TUNNEL_PREFIXES: [&str; 6] = ["tun", "tap", "ppp", "wg", "ipsec", "vpn"];

/// Adapter name fragments that indicate a VPN on Windows
const WINDOWS_VPN_MARKERS: [&str; 5] = ["vpn", "tap", "tun", "wireguard", "openvpn"];

/// Process names of known browsers
const BROWSERS: [&str; 8] = [
    "chrome", "chromium", "firefox", "msedge", "safari", "brave", "opera", "vivaldi",
];

/// What the monitor asks of the host besides DNS
#[async_trait]
pub trait HostProbe: Send + Sync {
    /// Names of tunnel-type interfaces that are up
    async fn tunnel_interfaces(&self) -> Result<Vec<String>>;

    /// Names of browser processes that are running
    async fn running_browsers(&self) -> Result<Vec<String>>;
}

/// Probes the real host
pub struct SystemProbes {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
}

impl SystemProbes {
    /// Probes for `platform`, running commands through `runner`
    pub fn new(platform: Platform, runner: Arc<dyn CommandRunner>) -> Self {
        Self { platform, runner }
    }
}

#[async_trait]
impl HostProbe for SystemProbes {
    async fn tunnel_interfaces(&self) -> Result<Vec<String>> {
        match &self.platform {
            Platform::Linux => {
                let out = self
                    .runner
                    .run(&CommandSpec::new("ip", ["-o", "link", "show"]))
                    .await?;
                Ok(parse_ip_link(&out))
            }
            Platform::MacOs => {
                let out = self
                    .runner
                    .run(&CommandSpec::new("ifconfig", Vec::<String>::new()))
                    .await?;
                Ok(parse_ifconfig(&out))
            }
            Platform::Windows => {
                let out = self
                    .runner
                    .run(&CommandSpec::new("netsh", ["interface", "show", "interface"]))
                    .await?;
                Ok(parse_windows_adapters(&out))
            }
            Platform::Other(name) => Err(FilterError::Unsupported {
                platform: name.clone(),
            }),
        }
    }

    async fn running_browsers(&self) -> Result<Vec<String>> {
        let names = match &self.platform {
            #[cfg(target_os = "linux")]
            Platform::Linux => tokio::task::spawn_blocking(linux_process_names)
                .await
                .map_err(|e| FilterError::ExecutionFailed(format!("process scan panicked: {e}")))??,
            #[cfg(not(target_os = "linux"))]
            Platform::Linux => {
                let out = self.runner.run(&CommandSpec::new("ps", ["-e", "-o", "comm="])).await?;
                out.lines().map(str::to_string).collect()
            }
            Platform::MacOs => {
                let out = self.runner.run(&CommandSpec::new("ps", ["-axco", "comm"])).await?;
                out.lines().skip(1).map(str::to_string).collect()
            }
            Platform::Windows => {
                let out = self
                    .runner
                    .run(&CommandSpec::new("tasklist", ["/fo", "csv", "/nh"]))
                    .await?;
                parse_tasklist(&out)
            }
            Platform::Other(name) => {
                return Err(FilterError::Unsupported {
                    platform: name.clone(),
                })
            }
        };
        Ok(match_browsers(&names))
    }
}

#[cfg(target_os = "linux")]
fn linux_process_names() -> Result<Vec<String>> {
    let all = procfs::process::all_processes()
        .map_err(|e| FilterError::ExecutionFailed(format!("cannot read /proc: {e}")))?;

    let mut names = Vec::new();
    for entry in all {
        let proc = match entry {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "skipping inaccessible process");
                continue;
            }
        };
        match proc.stat() {
            Ok(stat) => names.push(stat.comm),
            Err(e) => debug!(error = %e, "skipping process"),
        }
    }
    Ok(names)
}

fn is_tunnel_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    TUNNEL_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Tunnel interfaces that are up, from `ip -o link show`.
///
/// ```text
/// 5: tun0: <POINTOPOINT,MULTICAST,NOARP,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UNKNOWN
/// 6: wg0@NONE: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1420 qdisc noqueue state UNKNOWN
/// ```
#[must_use]
pub fn parse_ip_link(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, ": ");
            let _index = parts.next()?;
            let name = parts.next()?.split('@').next()?.trim();
            let flags = parts.next()?;
            let flags = flags.split_once('<')?.1.split_once('>')?.0;
            let up = flags.split(',').any(|f| f == "UP");
            (up && is_tunnel_name(name)).then(|| name.to_string())
        })
        .collect()
}

/// Tunnel interfaces from macOS `ifconfig`.
///
/// `utun*` devices exist even without a VPN (iCloud relay, Back to My Mac),
/// so they only count when they carry an IPv4 address.
#[must_use]
pub fn parse_ifconfig(output: &str) -> Vec<String> {
    fn finish(entry: Option<(String, bool, bool)>, found: &mut Vec<String>) {
        if let Some((name, up, has_inet)) = entry {
            let counts = if name.starts_with("utun") {
                has_inet
            } else {
                up && is_tunnel_name(&name)
            };
            if counts {
                found.push(name);
            }
        }
    }

    let mut found = Vec::new();
    let mut current: Option<(String, bool, bool)> = None;

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) && line.contains(": flags=") {
            finish(current.take(), &mut found);
            let name = line.split(':').next().unwrap_or_default().to_string();
            let up = line
                .split_once('<')
                .and_then(|(_, rest)| rest.split_once('>'))
                .is_some_and(|(flags, _)| flags.split(',').any(|f| f == "UP"));
            current = Some((name, up, false));
        } else if line.trim_start().starts_with("inet ") {
            if let Some(entry) = current.as_mut() {
                entry.2 = true;
            }
        }
    }
    finish(current.take(), &mut found);

    found
}

/// Connected VPN adapters from `netsh interface show interface`.
#[must_use]
pub fn parse_windows_adapters(output: &str) -> Vec<String> {
    crate::dns::interface::parse_netsh_show_interface(output)
        .into_iter()
        .filter(|name| {
            let lower = name.to_ascii_lowercase();
            WINDOWS_VPN_MARKERS.iter().any(|m| lower.contains(m))
        })
        .collect()
}

/// Image names from `tasklist /fo csv /nh`.
#[must_use]
pub fn parse_tasklist(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let first = line.trim().strip_prefix('"')?;
            first.split_once('"').map(|(name, _)| name.to_string())
        })
        .collect()
}

/// Browsers among the process names, each reported once.
#[must_use]
pub fn match_browsers(names: &[String]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for name in names {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let lower = base.to_ascii_lowercase();
        let lower = lower.strip_suffix(".exe").unwrap_or(&lower);
        let lower = lower.trim_start_matches("google ");
        if let Some(browser) = BROWSERS.iter().find(|b| lower.starts_with(*b)) {
            if !found.iter().any(|f| f == browser) {
                found.push((*browser).to_string());
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_ip_link() {
        let out = "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN\n\
                   2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP\n\
                   5: tun0: <POINTOPOINT,MULTICAST,NOARP,UP,LOWER_UP> mtu 1500 qdisc fq_codel\n\
                   6: wg0@NONE: <POINTOPOINT,NOARP,UP,LOWER_UP> mtu 1420 qdisc noqueue\n\
                   7: tap1: <BROADCAST,MULTICAST> mtu 1500 qdisc noop state DOWN\n";
        assert_eq!(parse_ip_link(out), names(&["tun0", "wg0"]));
    }

    #[test]
    fn test_parse_ifconfig() {
        let out = "lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384\n\
                   \tinet 127.0.0.1 netmask 0xff000000\n\
                   utun0: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1380\n\
                   \tinet6 fe80::1%utun0 prefixlen 64 scopeid 0x10\n\
                   utun3: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1400\n\
                   \tinet 10.8.0.2 --> 10.8.0.1 netmask 0xffffffff\n\
                   ppp0: flags=8051<UP,POINTOPOINT,RUNNING,MULTICAST> mtu 1280\n";
        assert_eq!(parse_ifconfig(out), names(&["utun3", "ppp0"]));
    }

    #[test]
    fn test_parse_windows_adapters() {
        let out = "Admin State    State          Type             Interface Name\r\n\
                   -------------------------------------------------------------------------\r\n\
                   Enabled        Connected      Dedicated        Wi-Fi\r\n\
                   Enabled        Connected      Dedicated        ProtonVPN TUN\r\n\
                   Enabled        Disconnected   Dedicated        OpenVPN TAP-Windows6\r\n";
        assert_eq!(parse_windows_adapters(out), names(&["ProtonVPN TUN"]));
    }

    #[test]
    fn test_parse_tasklist_and_match() {
        let out = "\"System Idle Process\",\"0\",\"Services\",\"0\",\"8 K\"\r\n\
                   \"chrome.exe\",\"4120\",\"Console\",\"1\",\"180,220 K\"\r\n\
                   \"chrome.exe\",\"4188\",\"Console\",\"1\",\"60,004 K\"\r\n\
                   \"msedge.exe\",\"5010\",\"Console\",\"1\",\"90,112 K\"\r\n";
        let procs = parse_tasklist(out);
        assert_eq!(procs.len(), 4);
        assert_eq!(match_browsers(&procs), names(&["chrome", "msedge"]));
    }

    #[test]
    fn test_match_browsers_unix_names() {
        let procs = names(&["systemd", "firefox-bin", "Google Chrome", "Safari", "bash"]);
        assert_eq!(match_browsers(&procs), names(&["firefox", "chrome", "safari"]));
        assert!(match_browsers(&names(&["sshd", "bash"])).is_empty());
    }
}
