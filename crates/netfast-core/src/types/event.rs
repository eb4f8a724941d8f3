use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason raised by the DNS integrity check
pub const REASON_DNS_MODIFIED: &str = "DNS settings were modified";

/// Reason raised by the VPN/tunnel check
pub const REASON_VPN_DETECTED: &str = "VPN/Proxy connection detected";

/// A detected attempt to bypass protection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// Free-text classification
    pub reason: String,

    /// When it was detected
    pub timestamp: DateTime<Utc>,
}

impl ViolationEvent {
    /// New event stamped now
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// The resolvers no longer match a filter profile
    #[must_use]
    pub fn dns_modified() -> Self {
        Self::new(REASON_DNS_MODIFIED)
    }

    /// A tunnel interface is up
    #[must_use]
    pub fn vpn_detected() -> Self {
        Self::new(REASON_VPN_DETECTED)
    }
}
