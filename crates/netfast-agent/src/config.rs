//! Agent configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty or missing file
//! yields a working agent.

use netfast_core::{
    FilterError, MonitoringConfig, ProfileTable, Result, SponsorContact, DEFAULT_PROFILE,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::monitor::Schedule;

/// Configuration for a NetFast agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Integrity monitor toggles.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Check periods.
    #[serde(default)]
    pub intervals: IntervalConfig,

    /// Profile re-applied by restore when nothing else is known (default: opendns).
    #[serde(default = "default_profile")]
    pub default_profile: String,

    /// Wait after a write before verifying it (milliseconds).
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// How often `run` re-reads this file (seconds).
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,

    /// Time an external command may run (seconds).
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Length of the fast, for progress reports.
    #[serde(default = "default_total_days")]
    pub total_days: u32,

    /// Path to the filter state file (default: data dir).
    pub state_path: Option<PathBuf>,

    /// Accountability contact; notifications are skipped without one.
    pub sponsor: Option<SponsorContact>,

    /// Accountability backend; notifications are only logged without one.
    pub api: Option<ApiConfig>,
}

/// Check periods in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalConfig {
    /// DNS integrity check (default: 30).
    #[serde(default = "default_dns_secs")]
    pub dns_secs: u64,

    /// VPN/tunnel check (default: 15).
    #[serde(default = "default_vpn_secs")]
    pub vpn_secs: u64,

    /// Usage sampling (default: 60).
    #[serde(default = "default_usage_secs")]
    pub usage_secs: u64,
}

/// Accountability backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.netfast.app`
    pub base_url: Url,

    /// Bearer token
    pub token: String,

    /// Identifier of this machine
    pub device_id: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            monitoring: MonitoringConfig::default(),
            intervals: IntervalConfig::default(),
            default_profile: default_profile(),
            settle_delay_ms: default_settle_delay(),
            reload_interval_secs: default_reload_interval(),
            command_timeout_secs: default_command_timeout(),
            total_days: default_total_days(),
            state_path: None,
            sponsor: None,
            api: None,
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            dns_secs: default_dns_secs(),
            vpn_secs: default_vpn_secs(),
            usage_secs: default_usage_secs(),
        }
    }
}

impl AgentConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self =
                toml::from_str(&content).map_err(|e| FilterError::Config(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Write config as TOML, creating the parent directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| FilterError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("intervals.dns_secs", self.intervals.dns_secs),
            ("intervals.vpn_secs", self.intervals.vpn_secs),
            ("intervals.usage_secs", self.intervals.usage_secs),
            ("reload_interval_secs", self.reload_interval_secs),
            ("command_timeout_secs", self.command_timeout_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(FilterError::Config(format!("{name} must be at least 1")));
        }

        ProfileTable::builtin().require(&self.default_profile)?;
        Ok(())
    }

    /// Check periods as a monitor schedule
    #[must_use]
    pub const fn schedule(&self) -> Schedule {
        Schedule {
            dns: Duration::from_secs(self.intervals.dns_secs),
            vpn: Duration::from_secs(self.intervals.vpn_secs),
            usage: Duration::from_secs(self.intervals.usage_secs),
        }
    }

    /// Settle delay as a duration
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Command timeout as a duration
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Config reload period as a duration
    #[must_use]
    pub const fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }
}

// Default value functions for serde.
fn default_profile() -> String {
    String::from(DEFAULT_PROFILE)
}

const fn default_settle_delay() -> u64 {
    2000
}

const fn default_reload_interval() -> u64 {
    60
}

const fn default_command_timeout() -> u64 {
    20
}

const fn default_total_days() -> u32 {
    40
}

const fn default_dns_secs() -> u64 {
    30
}

const fn default_vpn_secs() -> u64 {
    15
}

const fn default_usage_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.default_profile, "opendns");
        assert_eq!(config.intervals.dns_secs, 30);
        assert_eq!(config.intervals.vpn_secs, 15);
        assert_eq!(config.settle_delay_ms, 2000);
        assert_eq!(config.reload_interval_secs, 60);
        assert_eq!(config.total_days, 40);
        assert!(config.monitoring.proxy_vpn_detection);
        assert!(config.sponsor.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: AgentConfig = toml::from_str(
            r#"
            default_profile = "cleanbrowsing"

            [monitoring]
            usageMonitoring = true

            [intervals]
            vpn_secs = 5

            [sponsor]
            name = "Sam"
            email = "sam@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_profile, "cleanbrowsing");
        assert!(config.monitoring.usage_monitoring);
        assert!(config.monitoring.background_service);
        assert_eq!(config.intervals.vpn_secs, 5);
        assert_eq!(config.intervals.dns_secs, 30);
        assert_eq!(config.sponsor.unwrap().name, "Sam");
    }

    #[test]
    fn test_load_missing_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(AgentConfig::load(&path).unwrap(), AgentConfig::default());

        let mut config = AgentConfig::default();
        config.monitoring.set("proxyVpnDetection", false);
        config.api = Some(ApiConfig {
            base_url: Url::parse("https://api.example.com").unwrap(),
            token: "t0k3n".into(),
            device_id: "laptop".into(),
        });
        config.save(&path).unwrap();
        assert_eq!(AgentConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AgentConfig::default();
        config.intervals.dns_secs = 0;
        assert!(matches!(config.validate(), Err(FilterError::Config(_))));

        let mut config = AgentConfig::default();
        config.default_profile = "google".into();
        assert!(matches!(
            config.validate(),
            Err(FilterError::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_schedule() {
        let schedule = AgentConfig::default().schedule();
        assert_eq!(schedule.dns, Duration::from_secs(30));
        assert_eq!(schedule.vpn, Duration::from_secs(15));
        assert_eq!(schedule.usage, Duration::from_secs(60));
    }
}
