//! In-memory host used by the unit tests.
//!
//! `FakeNetwork` interprets the Linux command plans against a scripted
//! resolver state, so controller, monitor and escalation tests never touch
//! the machine running them.

use async_trait::async_trait;
use netfast_core::{
    FilterError, ProfileTable, ProgressReport, Result, SponsorContact, ViolationAlert,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::dns::DnsFilterController;
use crate::escalation::{EscalationMachine, Terminator};
use crate::exec::{CommandRunner, CommandSpec};
use crate::notifier::{AccountabilityNotifier, NotificationSink};
use crate::platform::Platform;
use crate::probe::{match_browsers, HostProbe};
use crate::state::FilterStateStore;

const LINK: &str = "eth0";

#[derive(Debug)]
struct FakeState {
    has_ipv6: bool,
    v4: Vec<String>,
    v6: Vec<String>,
    dhcp: Vec<String>,
    ignore_native_set: bool,
    deny_writes: bool,
    fail_reads: bool,
    tunnels: Vec<String>,
    processes: Vec<String>,
    root: bool,
    calls: Vec<String>,
}

/// Scripted single-link Linux host
#[derive(Debug)]
pub struct FakeNetwork {
    state: Mutex<FakeState>,
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeNetwork {
    /// Dual-stack `eth0` with a DHCP resolver and no overrides
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                has_ipv6: true,
                v4: Vec::new(),
                v6: Vec::new(),
                dhcp: vec!["192.168.1.1".into()],
                ignore_native_set: false,
                deny_writes: false,
                fail_reads: false,
                tunnels: Vec::new(),
                processes: Vec::new(),
                root: false,
                calls: Vec::new(),
            }),
        }
    }

    /// Every command run so far, rendered
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Writes fail with an elevation message
    pub fn deny_writes(&self, deny: bool) {
        self.lock().deny_writes = deny;
    }

    /// `resolvectl dns <link> …` succeeds without changing anything
    pub fn ignore_native_set(&self, ignore: bool) {
        self.lock().ignore_native_set = ignore;
    }

    /// Every read command fails
    pub fn fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Whether `eth0` has an IPv6 default route
    pub fn set_ipv6(&self, enabled: bool) {
        self.lock().has_ipv6 = enabled;
    }

    /// Whether `id -u` reports root
    pub fn set_root(&self, root: bool) {
        self.lock().root = root;
    }

    /// Bring up a tunnel interface
    pub fn add_tunnel(&self, name: &str) {
        self.lock().tunnels.push(name.to_string());
    }

    /// Replace the process list
    pub fn set_processes(&self, names: &[&str]) {
        self.lock().processes = names.iter().map(ToString::to_string).collect();
    }

    /// Overwrite the resolvers behind the agent's back
    pub fn tamper(&self, servers: &[&str]) {
        let mut state = self.lock();
        let (v6, v4): (Vec<String>, Vec<String>) = servers
            .iter()
            .map(ToString::to_string)
            .partition(|s| s.contains(':'));
        state.v4 = v4;
        state.v6 = v6;
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl FakeState {
    fn effective(&self) -> Vec<String> {
        if self.v4.is_empty() && self.v6.is_empty() {
            return self.dhcp.clone();
        }
        self.v4.iter().chain(self.v6.iter()).cloned().collect()
    }

    fn check_write(&self, spec: &CommandSpec) -> Result<()> {
        if self.deny_writes {
            return Err(FilterError::from_command_output(
                &spec.to_string(),
                "Failed to set DNS configuration: Access denied",
            ));
        }
        Ok(())
    }

    fn check_read(&self, spec: &CommandSpec) -> Result<()> {
        if self.fail_reads {
            return Err(FilterError::from_command_output(
                &spec.to_string(),
                "Failed to get global data: Connection refused",
            ));
        }
        Ok(())
    }

    fn link_show(&self) -> String {
        let mut out = String::from(
            "1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN\n\
             2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc fq_codel state UP\n",
        );
        for (i, name) in self.tunnels.iter().enumerate() {
            out.push_str(&format!(
                "{}: {name}: <POINTOPOINT,MULTICAST,NOARP,UP,LOWER_UP> mtu 1500 qdisc fq_codel\n",
                i + 3
            ));
        }
        out
    }
}

#[async_trait]
impl CommandRunner for FakeNetwork {
    async fn run(&self, spec: &CommandSpec) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(spec.to_string());

        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        match (spec.program.as_str(), args.as_slice()) {
            ("ip", ["-o", "-4", "route", "show", "default"]) => {
                Ok(format!("default via 192.168.1.1 dev {LINK} proto dhcp metric 100\n"))
            }
            ("ip", ["-o", "-6", "route", "show", "default"]) => Ok(if state.has_ipv6 {
                format!("default via fe80::1 dev {LINK} proto ra metric 100 pref medium\n")
            } else {
                String::new()
            }),
            ("ip", ["-o", "link", "show"]) => Ok(state.link_show()),
            ("resolvectl", ["dns"]) => {
                state.check_read(spec)?;
                Ok(format!(
                    "Global:\nLink 2 ({LINK}): {}\n",
                    state.effective().join(" ")
                ))
            }
            ("resolvectl", ["dns", link, servers @ ..]) if *link == LINK => {
                state.check_write(spec)?;
                if !state.ignore_native_set {
                    let (v6, v4): (Vec<String>, Vec<String>) = servers
                        .iter()
                        .map(ToString::to_string)
                        .partition(|s| s.contains(':'));
                    state.v4 = v4;
                    state.v6 = v6;
                }
                Ok(String::new())
            }
            ("resolvectl", ["revert", link]) if *link == LINK => {
                state.check_write(spec)?;
                state.v4.clear();
                state.v6.clear();
                Ok(String::new())
            }
            ("resolvectl", ["flush-caches"]) => Ok(String::new()),
            ("nmcli", ["device", "modify", link, key, list, _, _]) if *link == LINK => {
                state.check_write(spec)?;
                let servers: Vec<String> = list
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect();
                match *key {
                    "ipv4.dns" => state.v4 = servers,
                    "ipv6.dns" => state.v6 = servers,
                    other => {
                        return Err(FilterError::ExecutionFailed(format!("unknown key {other}")))
                    }
                }
                Ok(String::new())
            }
            ("cat", ["/etc/resolv.conf"]) => {
                state.check_read(spec)?;
                Ok(state
                    .effective()
                    .iter()
                    .map(|s| format!("nameserver {s}\n"))
                    .collect())
            }
            ("id", ["-u"]) => Ok(if state.root { "0\n" } else { "1000\n" }.to_string()),
            _ => Err(FilterError::ExecutionFailed(format!(
                "`{spec}`: command not found"
            ))),
        }
    }
}

#[async_trait]
impl HostProbe for FakeNetwork {
    async fn tunnel_interfaces(&self) -> Result<Vec<String>> {
        Ok(self.lock().tunnels.clone())
    }

    async fn running_browsers(&self) -> Result<Vec<String>> {
        Ok(match_browsers(&self.lock().processes))
    }
}

/// Counts `terminate` calls instead of exiting
#[derive(Debug, Default)]
pub struct RecordingTerminator {
    calls: AtomicU32,
}

impl RecordingTerminator {
    /// Times `terminate` ran
    pub fn count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Terminator for RecordingTerminator {
    async fn terminate(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps every delivered notification
#[derive(Debug, Default)]
pub struct RecordingSink {
    fail: bool,
    violations: Mutex<Vec<ViolationAlert>>,
    reports: Mutex<Vec<ProgressReport>>,
}

impl RecordingSink {
    /// Sink that records and then reports failure
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Alerts received
    pub fn violations(&self) -> Vec<ViolationAlert> {
        self.violations.lock().unwrap().clone()
    }

    /// Reports received
    pub fn reports(&self) -> Vec<ProgressReport> {
        self.reports.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<()> {
        if self.fail {
            Err(FilterError::Notify("503: backend unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver_violation(&self, alert: &ViolationAlert) -> Result<()> {
        self.violations.lock().unwrap().push(alert.clone());
        self.outcome()
    }

    async fn deliver_progress(&self, report: &ProgressReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        self.outcome()
    }
}

/// Fully wired controller, notifier and escalation over a [`FakeNetwork`]
pub struct Harness {
    pub net: Arc<FakeNetwork>,
    pub controller: Arc<DnsFilterController>,
    pub sink: Arc<RecordingSink>,
    pub notifier: Arc<AccountabilityNotifier>,
    pub terminator: Arc<RecordingTerminator>,
    pub escalation: Arc<EscalationMachine>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let net = Arc::new(FakeNetwork::new());
        let controller = Arc::new(DnsFilterController::new(
            Platform::Linux,
            net.clone(),
            ProfileTable::builtin(),
            FilterStateStore::new(dir.path().join("filter_state.json")),
            Duration::ZERO,
        ));
        let sink = Arc::new(RecordingSink::default());
        let notifier = Arc::new(AccountabilityNotifier::new(
            Some(SponsorContact {
                name: "Sam".into(),
                email: "sam@example.com".into(),
            }),
            sink.clone(),
            40,
        ));
        let terminator = Arc::new(RecordingTerminator::default());
        let escalation = Arc::new(EscalationMachine::new(
            Arc::clone(&controller),
            Arc::clone(&notifier),
            terminator.clone(),
            "opendns",
        ));

        Self {
            net,
            controller,
            sink,
            notifier,
            terminator,
            escalation,
            dir,
        }
    }
}
