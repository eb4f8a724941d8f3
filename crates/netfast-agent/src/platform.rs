//! Operating system detection.

use netfast_core::{FilterError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dns::commands::{powershell, ps_quote};
use crate::exec::CommandSpec;

/// Operating systems the agent knows how to drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Windows (netsh / PowerShell)
    Windows,
    /// macOS (networksetup / AppleScript)
    MacOs,
    /// Linux (resolvectl / NetworkManager)
    Linux,
    /// Anything else; every operation is `Unsupported`
    Other(String),
}

impl Platform {
    /// Platform this process is running on
    #[must_use]
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value
    #[must_use]
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "macos" => Self::MacOs,
            "linux" => Self::Linux,
            other => Self::Other(other.to_string()),
        }
    }

    /// Fail with `Unsupported` if there is no implementation path
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            Self::Other(name) => Err(FilterError::Unsupported {
                platform: name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Command whose success tells whether the process runs elevated.
    ///
    /// On Unix the output is the effective uid; on Windows `net session`
    /// only succeeds for administrators.
    pub fn elevation_probe(&self) -> Result<CommandSpec> {
        match self {
            Self::Windows => Ok(CommandSpec::new("net", ["session"])),
            Self::MacOs | Self::Linux => Ok(CommandSpec::new("id", ["-u"])),
            Self::Other(name) => Err(FilterError::Unsupported {
                platform: name.clone(),
            }),
        }
    }

    /// Command that runs `program args...` again with administrator rights.
    ///
    /// Unix goes through `sudo`, which prompts on the terminal. Windows asks
    /// for consent through `Start-Process -Verb RunAs` and waits for the
    /// elevated process to exit.
    pub fn elevated_relaunch(&self, program: &Path, args: &[String]) -> Result<CommandSpec> {
        let program = program.to_string_lossy().into_owned();
        match self {
            Self::Windows => {
                let mut script = format!(
                    "Start-Process -FilePath {} -Verb RunAs -Wait",
                    ps_quote(&program)
                );
                if !args.is_empty() {
                    // Start-Process joins the list with spaces, so keep each argument whole
                    let list = args
                        .iter()
                        .map(|a| {
                            if a.contains(char::is_whitespace) {
                                ps_quote(&format!("\"{a}\""))
                            } else {
                                ps_quote(a)
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(",");
                    script.push_str(&format!(" -ArgumentList {list}"));
                }
                Ok(powershell(&script))
            }
            Self::MacOs | Self::Linux => Ok(CommandSpec::new(
                "sudo",
                std::iter::once(program).chain(args.iter().cloned()),
            )),
            Self::Other(name) => Err(FilterError::Unsupported {
                platform: name.clone(),
            }),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::MacOs => write!(f, "macos"),
            Self::Linux => write!(f, "linux"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_os() {
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("macos"), Platform::MacOs);
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(
            Platform::from_os("freebsd"),
            Platform::Other("freebsd".into())
        );
    }

    #[test]
    fn test_unsupported() {
        let platform = Platform::Other("haiku".into());
        assert!(platform.ensure_supported().unwrap_err().is_unsupported());
        assert!(platform.elevation_probe().is_err());
        assert!(platform
            .elevated_relaunch(Path::new("netfast"), &[])
            .is_err());
        assert!(Platform::Linux.ensure_supported().is_ok());
    }

    #[test]
    fn test_unix_relaunch_goes_through_sudo() {
        let args = vec!["apply".to_string(), "opendns".to_string()];
        let spec = Platform::Linux
            .elevated_relaunch(Path::new("/usr/local/bin/netfast"), &args)
            .unwrap();
        assert_eq!(spec.program, "sudo");
        assert_eq!(spec.args, ["/usr/local/bin/netfast", "apply", "opendns"]);
    }

    #[test]
    fn test_windows_relaunch_asks_for_consent() {
        let args = vec![
            "--config".to_string(),
            r"C:\Users\O'Neil\My Config\netfast.toml".to_string(),
            "run".to_string(),
        ];
        let spec = Platform::Windows
            .elevated_relaunch(Path::new(r"C:\Program Files\NetFast\netfast.exe"), &args)
            .unwrap();
        assert_eq!(spec.program, "powershell");
        let script = spec.args.last().unwrap();
        assert!(script.starts_with(
            r"Start-Process -FilePath 'C:\Program Files\NetFast\netfast.exe' -Verb RunAs -Wait"
        ));
        assert!(script.ends_with(
            r#"-ArgumentList '--config','"C:\Users\O''Neil\My Config\netfast.toml"','run'"#
        ));
    }
}
