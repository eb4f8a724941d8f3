use serde::{Deserialize, Serialize};

/// Options the user can toggle for the integrity monitor.
///
/// Field names serialize in camelCase so the same document round-trips
/// through the dashboard settings page and the agent config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringConfig {
    /// Register the agent to launch at OS login
    pub auto_start_on_boot: bool,

    /// Keep enforcing after the foreground session ends
    pub background_service: bool,

    /// Sample running processes for known browsers
    pub usage_monitoring: bool,

    /// Reserved; accepted and persisted but has no effect
    pub screenshot_detection: bool,

    /// Check for VPN and tunnel interfaces
    pub proxy_vpn_detection: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            auto_start_on_boot: true,
            background_service: true,
            usage_monitoring: false,
            screenshot_detection: false,
            proxy_vpn_detection: true,
        }
    }
}

impl MonitoringConfig {
    /// Names of the recognized options, as used by `settings set`
    pub const KEYS: [&'static str; 5] = [
        "autoStartOnBoot",
        "backgroundService",
        "usageMonitoring",
        "screenshotDetection",
        "proxyVpnDetection",
    ];

    /// Set one option by name. Accepts camelCase or snake_case keys.
    ///
    /// Returns false if the key is not recognized.
    pub fn set(&mut self, key: &str, value: bool) -> bool {
        let normalized: String = key
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        let slot = match normalized.as_str() {
            "autostartonboot" => &mut self.auto_start_on_boot,
            "backgroundservice" => &mut self.background_service,
            "usagemonitoring" => &mut self.usage_monitoring,
            "screenshotdetection" => &mut self.screenshot_detection,
            "proxyvpndetection" => &mut self.proxy_vpn_detection,
            _ => return false,
        };
        *slot = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitoringConfig::default();
        assert!(config.auto_start_on_boot);
        assert!(config.background_service);
        assert!(!config.usage_monitoring);
        assert!(!config.screenshot_detection);
        assert!(config.proxy_vpn_detection);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: MonitoringConfig =
            serde_json::from_str(r#"{"usageMonitoring": true}"#).unwrap();
        assert!(config.usage_monitoring);
        assert!(config.proxy_vpn_detection);
    }

    #[test]
    fn test_set_by_key() {
        let mut config = MonitoringConfig::default();
        assert!(config.set("proxyVpnDetection", false));
        assert!(!config.proxy_vpn_detection);
        assert!(config.set("usage_monitoring", true));
        assert!(config.usage_monitoring);
        assert!(!config.set("telemetry", true));
    }
}
