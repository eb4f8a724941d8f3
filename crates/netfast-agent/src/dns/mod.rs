//! DNS filter controller.
//!
//! Points the active interface at a filter profile's resolvers, reads the
//! live configuration back, and hands resolver selection back to DHCP.
//! Every write is verified by a read after a settle delay, and a failed
//! native attempt falls back to the platform's scripting host.

pub mod commands;
pub mod interface;

pub use commands::CommandPath;
pub use interface::ActiveInterface;

use netfast_core::{
    extract_servers, AddressFamily, DnsObservation, FilterError, FilterProfile, ProfileTable,
    Result,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::exec::{CommandRunner, CommandSpec};
use crate::platform::Platform;
use crate::state::FilterStateStore;

/// Outcome of a verified `apply`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResult {
    /// Profile now in effect
    pub profile: FilterProfile,
    /// Interface that was configured
    pub interface: ActiveInterface,
    /// Tool family that succeeded
    pub path: CommandPath,
    /// Read-back after the settle delay
    pub observation: DnsObservation,
}

/// Outcome of a verified `remove`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedResult {
    /// Interface that was reset
    pub interface: ActiveInterface,
    /// Tool family that succeeded
    pub path: CommandPath,
    /// Read-back after the settle delay
    pub observation: DnsObservation,
}

#[derive(Debug, Clone)]
struct AppliedState {
    profile: String,
    interface: ActiveInterface,
}

/// Applies, verifies and removes DNS filter profiles.
///
/// `apply` and `remove` are serialized; `check_current` may run alongside them.
pub struct DnsFilterController {
    platform: Platform,
    runner: Arc<dyn CommandRunner>,
    profiles: ProfileTable,
    store: FilterStateStore,
    settle_delay: Duration,
    applied: Mutex<Option<AppliedState>>,
    op_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for DnsFilterController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsFilterController")
            .field("platform", &self.platform)
            .field("store", &self.store)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

impl DnsFilterController {
    /// Create a controller.
    pub fn new(
        platform: Platform,
        runner: Arc<dyn CommandRunner>,
        profiles: ProfileTable,
        store: FilterStateStore,
        settle_delay: Duration,
    ) -> Self {
        Self {
            platform,
            runner,
            profiles,
            store,
            settle_delay,
            applied: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Known profiles
    pub const fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    /// Platform being driven
    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Persisted state
    pub const fn store(&self) -> &FilterStateStore {
        &self.store
    }

    /// Point the active interface at `name`'s resolvers and verify.
    #[instrument(skip(self))]
    pub async fn apply(&self, name: &str) -> Result<AppliedResult> {
        let profile = self.profiles.require(name)?.clone();
        self.platform.ensure_supported()?;

        let _guard = self.op_lock.lock().await;
        let iface = interface::resolve(self.runner.as_ref(), &self.platform).await?;
        info!(profile = %profile.name, interface = %iface.name, "applying filter");

        let mut last_err = None;
        for path in CommandPath::ALL {
            let plan = commands::set_servers(&self.platform, path, &iface, &profile)?;
            match self.run_all(&plan).await {
                Ok(()) => {}
                Err(e) if e.is_permission_error() => return Err(e),
                Err(e) => {
                    warn!(%path, error = %e, "filter write failed");
                    last_err = Some(e);
                    continue;
                }
            }

            self.flush().await;
            tokio::time::sleep(self.settle_delay).await;

            let observation = self.check_current().await;
            if observation.matches(&profile) {
                *self.applied_lock() = Some(AppliedState {
                    profile: profile.name.clone(),
                    interface: iface.clone(),
                });
                info!(profile = %profile.name, %path, "filter verified");
                return Ok(AppliedResult {
                    profile,
                    interface: iface,
                    path,
                    observation,
                });
            }

            warn!(
                %path,
                servers = ?observation.raw_server_list,
                "resolvers did not match after write"
            );
            last_err = Some(FilterError::ExecutionFailed(format!(
                "resolvers did not switch to {} via the {path} path",
                profile.name
            )));
        }

        Err(last_err.unwrap_or_else(|| {
            FilterError::ExecutionFailed(format!("could not apply {}", profile.name))
        }))
    }

    /// Hand resolver selection back to DHCP and verify.
    #[instrument(skip(self))]
    pub async fn remove(&self) -> Result<RemovedResult> {
        self.platform.ensure_supported()?;

        let _guard = self.op_lock.lock().await;
        let cached = self.applied_lock().as_ref().map(|s| s.interface.clone());
        let iface = match cached {
            Some(iface) => iface,
            None => {
                // Nothing applied this session; reset every family
                let mut iface = interface::resolve(self.runner.as_ref(), &self.platform).await?;
                iface.families = vec![AddressFamily::V4, AddressFamily::V6];
                iface
            }
        };
        info!(interface = %iface.name, "removing filter");

        let mut last_err = None;
        for path in CommandPath::ALL {
            let plan = commands::reset_servers(&self.platform, path, &iface)?;
            match self.run_all(&plan).await {
                Ok(()) => {}
                Err(e) if e.is_permission_error() => return Err(e),
                Err(e) => {
                    warn!(%path, error = %e, "filter reset failed");
                    last_err = Some(e);
                    continue;
                }
            }

            self.flush().await;
            tokio::time::sleep(self.settle_delay).await;

            let observation = self.check_current().await;
            if observation.read_succeeded() && !observation.is_filtered {
                *self.applied_lock() = None;
                info!(%path, "filter removed");
                return Ok(RemovedResult {
                    interface: iface,
                    path,
                    observation,
                });
            }

            last_err = Some(FilterError::ExecutionFailed(format!(
                "resolvers still filtered after reset via the {path} path"
            )));
        }

        Err(last_err
            .unwrap_or_else(|| FilterError::ExecutionFailed("could not remove filter".into())))
    }

    /// Read and classify the live resolver configuration. Never fails.
    pub async fn check_current(&self) -> DnsObservation {
        let raw = match self.read_raw().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to read resolver configuration");
                let mut observation = DnsObservation::failed(e.to_string());
                observation.last_known_filter = self.last_known_filter();
                return observation;
            }
        };

        let servers = extract_servers(&raw);
        let matched = self.profiles.match_servers(&servers).cloned();
        let mut observation = DnsObservation::from_servers(&servers, matched);

        if let Some(name) = observation.profile_name() {
            let store = self.store.clone();
            let name = name.to_string();
            match tokio::task::spawn_blocking(move || store.save(&name)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "failed to persist filter state"),
                Err(e) => warn!(error = %e, "filter state writer panicked"),
            }
        } else {
            observation.last_known_filter = self.last_known_filter();
        }

        debug!(
            filtered = observation.is_filtered,
            servers = ?observation.raw_server_list,
            "resolver check"
        );
        observation
    }

    /// Last profile known to be in effect: this session's apply, else the
    /// persisted record. Names no longer in the table are ignored.
    pub fn last_known_filter(&self) -> Option<String> {
        let cached = self.applied_lock().as_ref().map(|s| s.profile.clone());
        cached
            .or_else(|| self.store.last_filter_type())
            .and_then(|name| self.profiles.get(&name).map(|p| p.name.clone()))
    }

    async fn read_raw(&self) -> Result<String> {
        self.platform.ensure_supported()?;

        let mut last_err = None;
        for path in CommandPath::ALL {
            let mut output = String::new();
            let mut any_ok = false;
            for spec in commands::read_servers(&self.platform, path)? {
                match self.runner.run(&spec).await {
                    Ok(out) => {
                        any_ok = true;
                        output.push_str(&out);
                        output.push('\n');
                    }
                    Err(e) => {
                        debug!(command = %spec, error = %e, "read command failed");
                        last_err = Some(e);
                    }
                }
            }
            if any_ok {
                return Ok(output);
            }
        }

        Err(last_err.unwrap_or_else(|| {
            FilterError::ExecutionFailed("no resolver read command succeeded".into())
        }))
    }

    async fn run_all(&self, plan: &[CommandSpec]) -> Result<()> {
        for spec in plan {
            self.runner.run(spec).await?;
        }
        Ok(())
    }

    async fn flush(&self) {
        let plan = match commands::flush_cache(&self.platform) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "no cache flush for this platform");
                return;
            }
        };
        for spec in plan {
            if let Err(e) = self.runner.run(&spec).await {
                warn!(command = %spec, error = %e, "cache flush failed");
            }
        }
    }

    fn applied_lock(&self) -> MutexGuard<'_, Option<AppliedState>> {
        self.applied
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
