//! Launch-at-login registration.

use netfast_core::{classify_failure, FailureKind, FilterError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::exec::{CommandRunner, CommandSpec};
use crate::platform::Platform;

/// Registry key holding per-user login items on Windows
const WINDOWS_RUN_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run";

/// Value name under the Run key
const WINDOWS_VALUE: &str = "NetFast";

/// LaunchAgent label on macOS
const LAUNCH_AGENT_LABEL: &str = "app.netfast.agent";

/// Registers `netfast run` to start when the user logs in
pub struct Autostart {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
    exe: PathBuf,
    base_dir: PathBuf,
}

impl std::fmt::Debug for Autostart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autostart")
            .field("platform", &self.platform)
            .field("exe", &self.exe)
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

impl Autostart {
    /// Registration for `exe`.
    ///
    /// `base_dir` is the XDG config dir on Linux and the home dir on macOS;
    /// Windows uses the registry and ignores it.
    pub fn new(
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
        exe: impl Into<PathBuf>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            platform,
            runner,
            exe: exe.into(),
            base_dir: base_dir.into(),
        }
    }

    /// Registration for the running executable and the current user.
    pub fn for_current_user(platform: Platform, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let base_dir = match platform {
            Platform::MacOs => dirs::home_dir(),
            _ => dirs::config_dir(),
        }
        .ok_or_else(|| FilterError::Config("no home directory for this user".to_string()))?;
        Ok(Self::new(platform, runner, exe, base_dir))
    }

    /// Make the registration match `enabled`.
    pub async fn sync(&self, enabled: bool) -> Result<()> {
        match &self.platform {
            Platform::Linux => {
                let path = self.base_dir.join("autostart").join("netfast.desktop");
                write_or_remove(&path, enabled.then(|| desktop_entry(&self.exe)))
            }
            Platform::MacOs => {
                let path = self
                    .base_dir
                    .join("Library")
                    .join("LaunchAgents")
                    .join(format!("{LAUNCH_AGENT_LABEL}.plist"));
                write_or_remove(&path, enabled.then(|| launch_agent(&self.exe)))
            }
            Platform::Windows => self.sync_registry(enabled).await,
            Platform::Other(name) => Err(FilterError::Unsupported {
                platform: name.clone(),
            }),
        }?;
        info!(enabled, "login start updated");
        Ok(())
    }

    async fn sync_registry(&self, enabled: bool) -> Result<()> {
        let spec = if enabled {
            CommandSpec::new(
                "reg",
                vec![
                    "add".to_string(),
                    WINDOWS_RUN_KEY.to_string(),
                    "/v".to_string(),
                    WINDOWS_VALUE.to_string(),
                    "/t".to_string(),
                    "REG_SZ".to_string(),
                    "/d".to_string(),
                    format!("\"{}\" run", self.exe.display()),
                    "/f".to_string(),
                ],
            )
        } else {
            CommandSpec::new("reg", ["delete", WINDOWS_RUN_KEY, "/v", WINDOWS_VALUE, "/f"])
        };

        match self.runner.run(&spec).await {
            Ok(_) => Ok(()),
            // Deleting a value that is not there is already the desired state
            Err(FilterError::ExecutionFailed(msg))
                if !enabled && classify_failure(&msg) == FailureKind::NotFound =>
            {
                debug!("login item was not registered");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn write_or_remove(path: &Path, content: Option<String>) -> Result<()> {
    match content {
        Some(content) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
            debug!(path = %path.display(), "login item written");
        }
        None if path.exists() => {
            std::fs::remove_file(path)?;
            debug!(path = %path.display(), "login item removed");
        }
        None => {}
    }
    Ok(())
}

fn desktop_entry(exe: &Path) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name=NetFast\n\
         Comment=Keep DNS filtering in place\n\
         Exec=\"{}\" run\n\
         X-GNOME-Autostart-enabled=true\n\
         NoDisplay=true\n",
        exe.display()
    )
}

fn launch_agent(exe: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LAUNCH_AGENT_LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
        <string>run</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
</dict>
</plist>
"#,
        xml_escape(&exe.display().to_string())
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
