//! Violation escalation.
//!
//! Counts violations against a fixed limit. Below the limit every violation
//! produces a warning the user can acknowledge or answer by restoring
//! protection; reaching it removes the filter and ends the process.

use async_trait::async_trait;
use netfast_core::{
    EscalationStage, EscalationStatus, EscalationTransition, FilterError, Result, ViolationEvent,
    MAX_VIOLATIONS,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::dns::DnsFilterController;
use crate::notifier::AccountabilityNotifier;

/// Time the UI gets to show the final notice before exit
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(3);

/// Capacity of the transition channel
const TRANSITION_CAPACITY: usize = 16;

/// Ends the process once the limit is reached
#[async_trait]
pub trait Terminator: Send + Sync {
    /// Never expected to return in production
    async fn terminate(&self);
}

/// Exits the process after a grace period
#[derive(Debug, Clone, Copy)]
pub struct ExitProcess {
    grace: Duration,
}

impl ExitProcess {
    /// Exit after `grace`
    #[must_use]
    pub const fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Default for ExitProcess {
    fn default() -> Self {
        Self::new(DEFAULT_EXIT_GRACE)
    }
}

#[async_trait]
impl Terminator for ExitProcess {
    async fn terminate(&self) {
        info!(grace_secs = self.grace.as_secs(), "protection session ended, exiting");
        tokio::time::sleep(self.grace).await;
        std::process::exit(0);
    }
}

#[derive(Debug, Default)]
struct CounterState {
    violation_count: u32,
    terminated: bool,
}

/// The warning/termination state machine
pub struct EscalationMachine {
    state: Mutex<CounterState>,
    max_violations: u32,
    controller: Arc<DnsFilterController>,
    notifier: Arc<AccountabilityNotifier>,
    terminator: Arc<dyn Terminator>,
    transitions: broadcast::Sender<EscalationTransition>,
    default_profile: String,
}

impl std::fmt::Debug for EscalationMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationMachine")
            .field("status", &self.status())
            .field("default_profile", &self.default_profile)
            .finish_non_exhaustive()
    }
}

impl EscalationMachine {
    /// New machine in the `Clean` stage.
    pub fn new(
        controller: Arc<DnsFilterController>,
        notifier: Arc<AccountabilityNotifier>,
        terminator: Arc<dyn Terminator>,
        default_profile: impl Into<String>,
    ) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            state: Mutex::new(CounterState::default()),
            max_violations: MAX_VIOLATIONS,
            controller,
            notifier,
            terminator,
            transitions,
            default_profile: default_profile.into(),
        }
    }

    /// Receive every transition published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EscalationTransition> {
        self.transitions.subscribe()
    }

    /// Current counter
    pub fn status(&self) -> EscalationStatus {
        let state = self.lock();
        self.status_of(&state)
    }

    /// Count a violation and act on it.
    ///
    /// The increment and the limit check happen under one lock, so concurrent
    /// calls at `max - 1` yield exactly one `Terminated`. Returns `None` once
    /// the session has ended.
    #[instrument(skip(self), fields(reason = %event.reason))]
    pub async fn on_violation(&self, event: ViolationEvent) -> Option<EscalationTransition> {
        let status = {
            let mut state = self.lock();
            if state.terminated {
                debug!("session already ended, ignoring violation");
                return None;
            }
            state.violation_count += 1;
            let status = self.status_of(&state);
            if status.stage == EscalationStage::Terminated {
                state.terminated = true;
            }
            status
        };

        warn!(
            count = status.violation_count,
            max = status.max_violations,
            "protection violation"
        );
        self.notifier.dispatch_violation(&event);

        if status.stage != EscalationStage::Terminated {
            let transition = EscalationTransition::Warned { event, status };
            self.publish(transition.clone());
            return Some(transition);
        }

        let transition = EscalationTransition::Terminated { event, status };
        self.publish(transition.clone());

        if let Err(e) = self.controller.remove().await {
            error!(error = %e, "failed to remove filter during termination");
        }
        self.terminator.terminate().await;
        Some(transition)
    }

    /// The user saw the warning and chose to continue.
    pub fn acknowledge(&self) -> Result<EscalationTransition> {
        let status = {
            let state = self.lock();
            if state.terminated {
                return Err(FilterError::Terminated);
            }
            self.status_of(&state)
        };
        let transition = EscalationTransition::Acknowledged { status };
        self.publish(transition.clone());
        Ok(transition)
    }

    /// Re-apply the last known filter and reset the counter.
    ///
    /// The counter only resets once the filter is verified in place.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<EscalationTransition> {
        if self.lock().terminated {
            return Err(FilterError::Terminated);
        }

        let profile = self
            .controller
            .last_known_filter()
            .unwrap_or_else(|| self.default_profile.clone());
        let applied = self.controller.apply(&profile).await?;

        let status = {
            let mut state = self.lock();
            if state.terminated {
                return Err(FilterError::Terminated);
            }
            state.violation_count = 0;
            self.status_of(&state)
        };

        let transition = EscalationTransition::Restored {
            profile: applied.profile.name,
            status,
        };
        self.publish(transition.clone());
        Ok(transition)
    }

    fn publish(&self, transition: EscalationTransition) {
        info!(?transition, "escalation transition");
        // No subscriber is fine; the UI may not be attached
        let _ = self.transitions.send(transition);
    }

    const fn status_of(&self, state: &CounterState) -> EscalationStatus {
        EscalationStatus::new(state.violation_count, self.max_violations)
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use netfast_core::REASON_DNS_MODIFIED;

    #[tokio::test]
    async fn test_single_violation_warns() {
        let h = Harness::new();
        let t = h.escalation.on_violation(ViolationEvent::dns_modified()).await.unwrap();

        match t {
            EscalationTransition::Warned { event, status } => {
                assert_eq!(event.reason, REASON_DNS_MODIFIED);
                assert_eq!(status.stage, EscalationStage::Warned);
                assert_eq!(status.remaining_warnings, 1);
            }
            other => panic!("expected warning, got {other:?}"),
        }
        assert_eq!(h.terminator.count(), 0);
    }

    #[tokio::test]
    async fn test_limit_terminates_and_removes_filter() {
        let h = Harness::new();
        h.controller.apply("opendns").await.unwrap();
        let mut rx = h.escalation.subscribe();

        h.escalation.on_violation(ViolationEvent::dns_modified()).await;
        let t = h.escalation.on_violation(ViolationEvent::vpn_detected()).await.unwrap();

        assert!(matches!(t, EscalationTransition::Terminated { .. }));
        assert_eq!(h.terminator.count(), 1);
        assert!(!h.controller.check_current().await.is_filtered);
        assert!(h.net.calls().iter().any(|c| c == "resolvectl revert eth0"));

        assert!(matches!(rx.recv().await.unwrap(), EscalationTransition::Warned { .. }));
        assert!(matches!(rx.recv().await.unwrap(), EscalationTransition::Terminated { .. }));
    }

    #[tokio::test]
    async fn test_termination_proceeds_when_remove_fails() {
        let h = Harness::new();
        h.net.deny_writes(true);

        h.escalation.on_violation(ViolationEvent::dns_modified()).await;
        h.escalation.on_violation(ViolationEvent::dns_modified()).await;
        assert_eq!(h.terminator.count(), 1);
    }

    #[tokio::test]
    async fn test_violations_ignored_after_termination() {
        let h = Harness::new();
        h.escalation.on_violation(ViolationEvent::dns_modified()).await;
        h.escalation.on_violation(ViolationEvent::dns_modified()).await;

        assert!(h.escalation.on_violation(ViolationEvent::dns_modified()).await.is_none());
        assert_eq!(h.terminator.count(), 1);
        assert!(matches!(h.escalation.restore().await, Err(FilterError::Terminated)));
        assert!(matches!(h.escalation.acknowledge(), Err(FilterError::Terminated)));
    }

    #[tokio::test]
    async fn test_acknowledge_keeps_count() {
        let h = Harness::new();
        h.escalation.on_violation(ViolationEvent::dns_modified()).await;
        let t = h.escalation.acknowledge().unwrap();
        assert!(matches!(
            t,
            EscalationTransition::Acknowledged { status } if status.violation_count == 1
        ));
        assert_eq!(h.escalation.status().stage, EscalationStage::Warned);
    }

    #[tokio::test]
    async fn test_restore_reapplies_last_profile_and_resets() {
        let h = Harness::new();
        h.controller.apply("cleanbrowsing").await.unwrap();
        h.net.tamper(&["8.8.8.8"]);
        h.escalation.on_violation(ViolationEvent::dns_modified()).await;

        let t = h.escalation.restore().await.unwrap();
        assert!(matches!(
            &t,
            EscalationTransition::Restored { profile, status }
                if profile == "cleanbrowsing" && status.violation_count == 0
        ));
        let obs = h.controller.check_current().await;
        assert_eq!(obs.profile_name(), Some("cleanbrowsing"));
    }

    #[tokio::test]
    async fn test_restore_uses_default_without_history() {
        let h = Harness::new();
        h.escalation.on_violation(ViolationEvent::dns_modified()).await;
        let t = h.escalation.restore().await.unwrap();
        assert!(matches!(t, EscalationTransition::Restored { profile, .. } if profile == "opendns"));
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_count() {
        let h = Harness::new();
        h.escalation.on_violation(ViolationEvent::dns_modified()).await;
        h.net.deny_writes(true);

        let err = h.escalation.restore().await.unwrap_err();
        assert!(err.is_permission_error());
        assert_eq!(h.escalation.status().violation_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_violations_terminate_once() {
        for _ in 0..20 {
            let h = Harness::new();
            h.escalation.on_violation(ViolationEvent::dns_modified()).await;

            let a = tokio::spawn({
                let esc = Arc::clone(&h.escalation);
                async move { esc.on_violation(ViolationEvent::dns_modified()).await }
            });
            let b = tokio::spawn({
                let esc = Arc::clone(&h.escalation);
                async move { esc.on_violation(ViolationEvent::vpn_detected()).await }
            });
            let results = [a.await.unwrap(), b.await.unwrap()];

            let terminated = results
                .iter()
                .filter(|t| matches!(t, Some(EscalationTransition::Terminated { .. })))
                .count();
            assert_eq!(terminated, 1);
            assert_eq!(h.terminator.count(), 1);
        }
    }
}
