use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::profile::FilterProfile;

/// A point-in-time read of the system's configured resolvers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsObservation {
    /// Resolvers found in the tool output, in configured order
    pub raw_server_list: Vec<String>,

    /// Profile the live resolvers belong to
    pub matched_profile: Option<FilterProfile>,

    /// True iff `matched_profile` is present
    pub is_filtered: bool,

    /// Last provider name persisted by an earlier successful match.
    /// Display only; never feeds `is_filtered`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_filter: Option<String>,

    /// Why the read failed, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,

    /// When the read was taken
    pub observed_at: DateTime<Utc>,
}

impl DnsObservation {
    /// Observation from a successful read.
    #[must_use]
    pub fn from_servers(servers: &[IpAddr], matched: Option<FilterProfile>) -> Self {
        Self {
            raw_server_list: servers.iter().map(ToString::to_string).collect(),
            is_filtered: matched.is_some(),
            matched_profile: matched,
            last_known_filter: None,
            read_error: None,
            observed_at: Utc::now(),
        }
    }

    /// Observation standing in for a read that failed.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            raw_server_list: Vec::new(),
            matched_profile: None,
            is_filtered: false,
            last_known_filter: None,
            read_error: Some(error.into()),
            observed_at: Utc::now(),
        }
    }

    /// True if the underlying read succeeded
    #[must_use]
    pub const fn read_succeeded(&self) -> bool {
        self.read_error.is_none()
    }

    /// Name of the matched profile
    #[must_use]
    pub fn profile_name(&self) -> Option<&str> {
        self.matched_profile.as_ref().map(|p| p.name.as_str())
    }

    /// True if the live resolvers belong to `profile`
    #[must_use]
    pub fn matches(&self, profile: &FilterProfile) -> bool {
        self.profile_name() == Some(profile.name.as_str())
    }

    /// Best name to show the user: the live match, else the last persisted one
    #[must_use]
    pub fn display_filter(&self) -> Option<&str> {
        self.profile_name().or(self.last_known_filter.as_deref())
    }
}
