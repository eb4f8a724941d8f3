//! netfast-agent: local DNS filter enforcement.
//!
//! Forces the machine's DNS resolution through a filtering provider, keeps
//! checking that the filter is still in effect, and escalates through a
//! bounded warning/termination policy when it is not.
//!
//! # Architecture
//!
//! ```text
//! IntegrityMonitor (independent timers)
//!   dns check ──┐
//!   vpn check ──┼──> EscalationMachine ──> DnsFilterController (restore / remove)
//!   usage      ─┘          │                      │
//!   (strength moments)     └──> AccountabilityNotifier
//!                                                 CommandRunner (platform tools)
//! ```
//!
//! Everything that touches the host goes through a [`CommandRunner`], so the
//! whole stack runs against an in-memory network in tests.

pub mod agent;
pub mod autostart;
pub mod config;
pub mod dns;
pub mod escalation;
pub mod exec;
pub mod monitor;
pub mod notifier;
pub mod platform;
pub mod probe;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience.
pub use agent::{Agent, AgentBuilder, ElevationStatus, Envelope};
pub use autostart::Autostart;
pub use config::{AgentConfig, ApiConfig, IntervalConfig};
pub use dns::{AppliedResult, CommandPath, DnsFilterController, RemovedResult};
pub use escalation::{EscalationMachine, ExitProcess, Terminator};
pub use exec::{CommandRunner, CommandSpec, SystemRunner};
pub use monitor::{IntegrityMonitor, MonitorState, Schedule};
pub use netfast_core::{FilterError, Result};
pub use notifier::{AccountabilityNotifier, ApiSink, LogSink, NotificationSink};
pub use platform::Platform;
pub use probe::{HostProbe, SystemProbes};
pub use state::FilterStateStore;
