use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{ViolationEvent, REASON_DNS_MODIFIED, REASON_VPN_DETECTED};

/// External accountability contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorContact {
    /// Display name
    pub name: String,

    /// Delivery address
    pub email: String,
}

/// Violation alert handed to the delivery collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationAlert {
    /// Who to tell
    pub sponsor_contact: SponsorContact,

    /// What happened
    pub violation_reason: String,

    /// When it happened
    pub timestamp: DateTime<Utc>,
}

impl ViolationAlert {
    /// Alert for an event
    #[must_use]
    pub fn new(sponsor: SponsorContact, event: &ViolationEvent) -> Self {
        Self {
            sponsor_contact: sponsor,
            violation_reason: event.reason.clone(),
            timestamp: event.timestamp,
        }
    }

    /// The backend's violation type for this reason
    #[must_use]
    pub fn violation_type(&self) -> ViolationType {
        ViolationType::from_reason(&self.violation_reason)
    }
}

/// Violation categories understood by the accountability backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// Resolvers were changed away from the filter
    DnsSettingsChange,
    /// A tunnel interface was up
    VpnUsage,
    /// Any other bypass attempt
    DnsBypassAttempt,
}

impl ViolationType {
    /// Map a free-text reason to a category
    #[must_use]
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            REASON_DNS_MODIFIED => Self::DnsSettingsChange,
            REASON_VPN_DETECTED => Self::VpnUsage,
            _ => Self::DnsBypassAttempt,
        }
    }
}

/// A neutral data point recorded by usage sampling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrengthMoment {
    /// Description
    pub moment: String,

    /// When it was recorded
    pub timestamp: DateTime<Utc>,
}

/// Progress of the current fast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    /// Days since the fast began
    pub days_completed: u32,

    /// Length of the fast
    pub total_days: u32,

    /// Violations recorded this session
    pub violation_count: u32,

    /// Most recent violation
    pub last_violation: Option<DateTime<Utc>>,

    /// Recorded strength moments
    pub strength_moments: Vec<StrengthMoment>,
}

impl ProgressSummary {
    /// Completion percentage, rounded, capped at 100
    #[must_use]
    pub fn completion_percent(&self) -> u32 {
        if self.total_days == 0 {
            return 0;
        }
        let pct = (f64::from(self.days_completed) / f64::from(self.total_days) * 100.0).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let pct = pct as u32;
        pct.min(100)
    }
}

/// Progress report handed to the delivery collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Who to tell
    pub sponsor_contact: SponsorContact,

    /// Progress so far
    pub progress_summary: ProgressSummary,

    /// When the report was produced
    pub timestamp: DateTime<Utc>,
}
