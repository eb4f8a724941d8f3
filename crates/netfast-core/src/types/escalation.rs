use serde::{Deserialize, Serialize};

use super::event::ViolationEvent;

/// Violations allowed before termination: one warning, then the end
pub const MAX_VIOLATIONS: u32 = 2;

/// Where the escalation state machine stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStage {
    /// No outstanding violations
    Clean,
    /// At least one violation, warnings remain
    Warned,
    /// The limit was reached; the process is ending
    Terminated,
}

/// Snapshot of the violation counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationStatus {
    /// Violations since the last restore
    pub violation_count: u32,

    /// Count at which the session ends
    pub max_violations: u32,

    /// `max(0, max_violations - violation_count)`
    pub remaining_warnings: u32,

    /// Current stage
    pub stage: EscalationStage,
}

impl EscalationStatus {
    /// Derive the status for a count.
    #[must_use]
    pub const fn new(violation_count: u32, max_violations: u32) -> Self {
        let stage = if violation_count >= max_violations {
            EscalationStage::Terminated
        } else if violation_count == 0 {
            EscalationStage::Clean
        } else {
            EscalationStage::Warned
        };

        Self {
            violation_count,
            max_violations,
            remaining_warnings: max_violations.saturating_sub(violation_count),
            stage,
        }
    }
}

/// A change published by the escalation state machine for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EscalationTransition {
    /// First violation: show the compassionate warning with a restore option
    Warned {
        /// What triggered it
        event: ViolationEvent,
        /// Counter after the increment
        status: EscalationStatus,
    },

    /// The user acknowledged the warning without restoring
    Acknowledged {
        /// Counter, unchanged
        status: EscalationStatus,
    },

    /// The filter was re-applied and the counter reset
    Restored {
        /// Profile that was re-applied
        profile: String,
        /// Counter after the reset
        status: EscalationStatus,
    },

    /// Final violation: the filter is being removed and the process will exit
    Terminated {
        /// What triggered it
        event: ViolationEvent,
        /// Counter at termination
        status: EscalationStatus,
    },
}
