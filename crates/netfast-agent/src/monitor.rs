//! Integrity monitor.
//!
//! Runs the periodic checks on independent timers. Each check is its own task
//! so a slow external command never delays another check, and a failing
//! check only logs; its timer keeps going.

use netfast_core::{MonitoringConfig, ViolationEvent};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::dns::DnsFilterController;
use crate::escalation::EscalationMachine;
use crate::notifier::AccountabilityNotifier;
use crate::probe::HostProbe;

/// Check periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// DNS integrity check
    pub dns: Duration,
    /// VPN/tunnel check
    pub vpn: Duration,
    /// Usage sampling
    pub usage: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            dns: Duration::from_secs(30),
            vpn: Duration::from_secs(15),
            usage: Duration::from_secs(60),
        }
    }
}

/// What the monitor is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorState {
    /// Timers are scheduled
    pub running: bool,
    /// Settings in force (or to be used on the next start)
    pub config: MonitoringConfig,
}

/// The individual checks, shared by every timer task
#[derive(Clone)]
struct Checks {
    controller: Arc<DnsFilterController>,
    probes: Arc<dyn HostProbe>,
    escalation: Arc<EscalationMachine>,
    notifier: Arc<AccountabilityNotifier>,
}

impl Checks {
    async fn dns_integrity(&self) {
        let observation = self.controller.check_current().await;
        if let Some(err) = &observation.read_error {
            warn!(error = %err, "DNS check could not read resolvers");
            return;
        }
        if observation.is_filtered {
            debug!(profile = ?observation.profile_name(), "DNS filter intact");
            return;
        }

        warn!(servers = ?observation.raw_server_list, "DNS settings were modified");
        self.escalation
            .on_violation(ViolationEvent::dns_modified())
            .await;
    }

    async fn vpn_status(&self) {
        match self.probes.tunnel_interfaces().await {
            Ok(tunnels) if tunnels.is_empty() => debug!("no tunnel interfaces"),
            Ok(tunnels) => {
                warn!(interfaces = ?tunnels, "VPN/Proxy connection detected");
                self.escalation
                    .on_violation(ViolationEvent::vpn_detected())
                    .await;
            }
            Err(e) => warn!(error = %e, "VPN check failed"),
        }
    }

    async fn usage_sample(&self) {
        match self.probes.running_browsers().await {
            Ok(browsers) => {
                for browser in browsers {
                    self.notifier
                        .add_strength_moment(format!("Browser running: {browser}"));
                }
            }
            Err(e) => warn!(error = %e, "usage sample failed"),
        }
    }
}

struct RunningChecks {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

struct MonitorInner {
    config: MonitoringConfig,
    running: Option<RunningChecks>,
}

/// Schedules the DNS, VPN and usage checks
pub struct IntegrityMonitor {
    checks: Checks,
    schedule: Schedule,
    inner: Mutex<MonitorInner>,
}

impl std::fmt::Debug for IntegrityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityMonitor")
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl IntegrityMonitor {
    /// Monitor with the given settings; nothing runs until [`start`](Self::start).
    pub fn new(
        controller: Arc<DnsFilterController>,
        probes: Arc<dyn HostProbe>,
        escalation: Arc<EscalationMachine>,
        notifier: Arc<AccountabilityNotifier>,
        schedule: Schedule,
        config: MonitoringConfig,
    ) -> Self {
        Self {
            checks: Checks {
                controller,
                probes,
                escalation,
                notifier,
            },
            schedule,
            inner: Mutex::new(MonitorInner {
                config,
                running: None,
            }),
        }
    }

    /// Schedule the enabled checks. No-op if already running.
    pub async fn start(&self) {
        let mut inner = self.inner.lock().await;
        if inner.running.is_none() {
            inner.running = Some(self.spawn_checks(inner.config));
        }
    }

    /// Stop scheduling checks.
    ///
    /// A check already in progress finishes but schedules no successor.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        Self::halt(&mut inner);
    }

    /// Replace the settings as one step: stop, swap, start again if it was running.
    pub async fn update_settings(&self, config: MonitoringConfig) {
        let mut inner = self.inner.lock().await;
        let was_running = Self::halt(&mut inner);
        inner.config = config;
        if was_running {
            inner.running = Some(self.spawn_checks(config));
        }
        info!(?config, "monitoring settings updated");
    }

    /// Running flag and settings
    pub async fn state(&self) -> MonitorState {
        let inner = self.inner.lock().await;
        MonitorState {
            running: inner.running.is_some(),
            config: inner.config,
        }
    }

    /// Current settings
    pub async fn config(&self) -> MonitoringConfig {
        self.inner.lock().await.config
    }

    fn halt(inner: &mut MonitorInner) -> bool {
        let Some(running) = inner.running.take() else {
            return false;
        };
        // Receivers may already be gone if a task ended
        let _ = running.shutdown.send(true);
        debug!(tasks = running.tasks.len(), "monitor stopped");
        true
    }

    fn spawn_checks(&self, config: MonitoringConfig) -> RunningChecks {
        let (shutdown, rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(3);

        let checks = self.checks.clone();
        tasks.push(spawn_periodic("dns", self.schedule.dns, rx.clone(), move || {
            let checks = checks.clone();
            async move { checks.dns_integrity().await }
        }));

        if config.proxy_vpn_detection {
            let checks = self.checks.clone();
            tasks.push(spawn_periodic("vpn", self.schedule.vpn, rx.clone(), move || {
                let checks = checks.clone();
                async move { checks.vpn_status().await }
            }));
        }

        if config.usage_monitoring {
            let checks = self.checks.clone();
            tasks.push(spawn_periodic("usage", self.schedule.usage, rx, move || {
                let checks = checks.clone();
                async move { checks.usage_sample().await }
            }));
        }

        if config.screenshot_detection {
            info!("screenshot detection is not available yet; setting saved");
        }

        info!(checks = tasks.len(), "monitor started");
        RunningChecks { shutdown, tasks }
    }
}

/// Run `check` every `period`, first after one full period.
fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    check: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => check().await,
            }
        }
        debug!(check = name, "timer cancelled");
    })
}
