//! The agent facade used by the UI layer.
//!
//! Built once per process. Every handler returns an [`Envelope`] so a caller
//! can render success and failure the same way, with the user-facing message
//! already chosen.

use netfast_core::{
    DnsObservation, EscalationStatus, EscalationTransition, FilterError, FilterProfile,
    MonitoringConfig, ProfileTable, ProgressReport, ProgressSummary, Result,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::autostart::Autostart;
use crate::config::AgentConfig;
use crate::dns::{AppliedResult, DnsFilterController, RemovedResult};
use crate::escalation::{EscalationMachine, ExitProcess, Terminator};
use crate::exec::{CommandRunner, SystemRunner};
use crate::monitor::{IntegrityMonitor, MonitorState};
use crate::notifier::{AccountabilityNotifier, ApiSink, LogSink, NotificationSink};
use crate::platform::Platform;
use crate::probe::{HostProbe, SystemProbes};
use crate::state::FilterStateStore;

/// Uniform handler response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Whether the operation succeeded
    pub success: bool,

    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,

    /// User-facing message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Technical detail on failure, for logs and `--verbose`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl<T> Envelope<T> {
    /// Successful response
    pub const fn ok(result: T) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            detail: None,
        }
    }

    /// Failed response
    pub fn err(error: &FilterError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.user_message()),
            detail: Some(error.to_string()),
        }
    }

    /// Wrap a result
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => {
                warn!(error = %e, "operation failed");
                Self::err(&e)
            }
        }
    }
}

/// Whether the process holds administrator rights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElevationStatus {
    /// True if DNS settings can be changed without prompting
    pub elevated: bool,
}

/// Assembles an [`Agent`] from config plus optional overrides
pub struct AgentBuilder {
    config: AgentConfig,
    platform: Option<Platform>,
    runner: Option<Arc<dyn CommandRunner>>,
    probes: Option<Arc<dyn HostProbe>>,
    sink: Option<Arc<dyn NotificationSink>>,
    terminator: Option<Arc<dyn Terminator>>,
    store: Option<FilterStateStore>,
    autostart: Option<Autostart>,
}

impl AgentBuilder {
    /// Builder over `config`
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            platform: None,
            runner: None,
            probes: None,
            sink: None,
            terminator: None,
            store: None,
            autostart: None,
        }
    }

    /// Drive a specific platform (default: the current one)
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Run commands through `runner` (default: [`SystemRunner`])
    #[must_use]
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Probe the host through `probes` (default: [`SystemProbes`])
    #[must_use]
    pub fn probes(mut self, probes: Arc<dyn HostProbe>) -> Self {
        self.probes = Some(probes);
        self
    }

    /// Deliver notifications to `sink` (default: API if configured, else log)
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// End the process through `terminator` (default: [`ExitProcess`])
    #[must_use]
    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Persist filter state in `store` (default: config path, else data dir)
    #[must_use]
    pub fn store(mut self, store: FilterStateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Keep login start in sync with `autoStartOnBoot`
    #[must_use]
    pub fn autostart(mut self, autostart: Autostart) -> Self {
        self.autostart = Some(autostart);
        self
    }

    /// Validate the config and wire everything together.
    pub fn build(self) -> Result<Agent> {
        let config = self.config;
        config.validate()?;

        let platform = self.platform.unwrap_or_else(Platform::current);
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(SystemRunner::new(config.command_timeout())));
        let probes = self
            .probes
            .unwrap_or_else(|| Arc::new(SystemProbes::new(platform.clone(), Arc::clone(&runner))));

        let store = match (self.store, &config.state_path) {
            (Some(store), _) => store,
            (None, Some(path)) => FilterStateStore::new(path),
            (None, None) => FilterStateStore::at_default_location()?,
        };

        let sink: Arc<dyn NotificationSink> = match (self.sink, &config.api) {
            (Some(sink), _) => sink,
            (None, Some(api)) => Arc::new(ApiSink::new(api)?),
            (None, None) => Arc::new(LogSink),
        };
        let terminator = self
            .terminator
            .unwrap_or_else(|| Arc::new(ExitProcess::default()));

        let controller = Arc::new(DnsFilterController::new(
            platform.clone(),
            Arc::clone(&runner),
            ProfileTable::builtin(),
            store,
            config.settle_delay(),
        ));
        let notifier = Arc::new(AccountabilityNotifier::new(
            config.sponsor.clone(),
            sink,
            config.total_days,
        ));
        let escalation = Arc::new(EscalationMachine::new(
            Arc::clone(&controller),
            Arc::clone(&notifier),
            terminator,
            config.default_profile.clone(),
        ));
        let monitor = IntegrityMonitor::new(
            Arc::clone(&controller),
            probes,
            Arc::clone(&escalation),
            Arc::clone(&notifier),
            config.schedule(),
            config.monitoring,
        );

        info!(%platform, "agent ready");
        Ok(Agent {
            platform,
            runner,
            controller,
            escalation,
            notifier,
            monitor,
            autostart: self.autostart,
            config: Mutex::new(config),
        })
    }
}

/// Handlers for the UI layer
pub struct Agent {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
    controller: Arc<DnsFilterController>,
    escalation: Arc<EscalationMachine>,
    notifier: Arc<AccountabilityNotifier>,
    monitor: IntegrityMonitor,
    autostart: Option<Autostart>,
    config: Mutex<AgentConfig>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("platform", &self.platform)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Builder over `config`
    #[must_use]
    pub fn builder(config: AgentConfig) -> AgentBuilder {
        AgentBuilder::new(config)
    }

    /// Platform being driven
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Config the agent is running with
    pub fn config(&self) -> AgentConfig {
        self.config_lock().clone()
    }

    /// Known filter profiles
    pub fn profiles(&self) -> Vec<FilterProfile> {
        self.controller.profiles().iter().cloned().collect()
    }

    /// Live resolver state. Always succeeds.
    pub async fn check_status(&self) -> Envelope<DnsObservation> {
        Envelope::ok(self.controller.check_current().await)
    }

    /// Apply and verify a filter profile
    pub async fn apply_filter(&self, name: &str) -> Envelope<AppliedResult> {
        Envelope::from_result(self.controller.apply(name).await)
    }

    /// Hand resolvers back to DHCP
    pub async fn remove_filter(&self) -> Envelope<RemovedResult> {
        Envelope::from_result(self.controller.remove().await)
    }

    /// Report whether the process runs with administrator rights.
    pub async fn request_elevated_privileges(&self) -> Envelope<ElevationStatus> {
        Envelope::from_result(self.elevation().await)
    }

    async fn elevation(&self) -> Result<ElevationStatus> {
        let probe = self.platform.elevation_probe()?;
        let elevated = match (&self.platform, self.runner.run(&probe).await) {
            (Platform::Windows, Ok(_)) => true,
            (Platform::Windows, Err(FilterError::PermissionDenied(_))) => false,
            (_, Ok(uid)) => uid.trim() == "0",
            (_, Err(e)) => return Err(e),
        };
        Ok(ElevationStatus { elevated })
    }

    /// Replace the monitor settings and sync login start.
    pub async fn update_monitoring_settings(
        &self,
        settings: MonitoringConfig,
    ) -> Envelope<MonitoringConfig> {
        let previous = self.monitor.config().await;
        self.monitor.update_settings(settings).await;
        self.config_lock().monitoring = settings;

        if let Some(autostart) = &self.autostart {
            if previous.auto_start_on_boot != settings.auto_start_on_boot {
                if let Err(e) = autostart.sync(settings.auto_start_on_boot).await {
                    warn!(error = %e, "failed to update login start");
                    return Envelope::err(&e);
                }
            }
        }
        Envelope::ok(settings)
    }

    /// Violation counter
    pub fn get_escalation_status(&self) -> Envelope<EscalationStatus> {
        Envelope::ok(self.escalation.status())
    }

    /// Start the periodic checks and register login start if enabled.
    pub async fn start_monitoring(&self) {
        let settings = self.monitor.config().await;
        if let Some(autostart) = &self.autostart {
            if let Err(e) = autostart.sync(settings.auto_start_on_boot).await {
                warn!(error = %e, "failed to update login start");
            }
        }
        self.monitor.start().await;
    }

    /// Stop the periodic checks
    pub async fn stop_monitoring(&self) {
        self.monitor.stop().await;
    }

    /// Monitor running flag and settings
    pub async fn monitor_state(&self) -> MonitorState {
        self.monitor.state().await
    }

    /// Escalation transitions, for the UI
    pub fn subscribe(&self) -> broadcast::Receiver<EscalationTransition> {
        self.escalation.subscribe()
    }

    /// The user chose to continue after a warning
    pub fn acknowledge_warning(&self) -> Envelope<EscalationTransition> {
        Envelope::from_result(self.escalation.acknowledge())
    }

    /// The user chose to restore protection after a warning
    pub async fn restore_protection(&self) -> Envelope<EscalationTransition> {
        Envelope::from_result(self.escalation.restore().await)
    }

    /// Progress so far
    pub fn progress(&self) -> ProgressSummary {
        self.notifier.progress()
    }

    /// Send the sponsor a progress report; `None` without a sponsor
    pub async fn send_progress_report(&self) -> Envelope<Option<ProgressReport>> {
        Envelope::from_result(self.notifier.send_progress_report().await)
    }

    /// Apply a re-read config file. Only the monitoring section takes effect
    /// without a restart. Returns true if it changed.
    pub async fn reload_config(&self, config: AgentConfig) -> bool {
        let current = self.config_lock().monitoring;
        if current == config.monitoring {
            return false;
        }
        info!("monitoring settings changed on disk");
        let _ = self.update_monitoring_settings(config.monitoring).await;
        true
    }

    fn config_lock(&self) -> MutexGuard<'_, AgentConfig> {
        self.config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
