//! Accountability notifier.
//!
//! Tracks progress through the fast and tells the sponsor about violations.
//! Delivery goes through a [`NotificationSink`]; the escalation path never
//! waits for it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netfast_core::{
    FilterError, ProgressReport, ProgressSummary, Result, SponsorContact, StrengthMoment,
    ViolationAlert, ViolationEvent,
};
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ApiConfig;

/// Subject line of violation messages
pub const VIOLATION_SUBJECT: &str = "NetFast - Spiritual Support Needed";

/// Request timeout for the backend
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Strength moments kept in memory; the oldest are dropped first
pub const MAX_STRENGTH_MOMENTS: usize = 256;

/// Where notifications end up
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a violation alert
    async fn deliver_violation(&self, alert: &ViolationAlert) -> Result<()>;

    /// Deliver a progress report
    async fn deliver_progress(&self, report: &ProgressReport) -> Result<()>;
}

/// Renders messages as text and writes them to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl LogSink {
    /// Subject and body of a violation message
    #[must_use]
    pub fn render_violation(alert: &ViolationAlert) -> (String, String) {
        let body = format!(
            "Dear {},\n\n\
             Someone you are supporting during their NetFast needs encouragement.\n\n\
             What happened: {}\n\
             When: {}\n\n\
             A short message or call from you could make all the difference today.\n",
            alert.sponsor_contact.name,
            alert.violation_reason,
            alert.timestamp.format("%Y-%m-%d %H:%M UTC"),
        );
        (VIOLATION_SUBJECT.to_string(), body)
    }

    /// Subject and body of a progress message
    #[must_use]
    pub fn render_progress(report: &ProgressReport) -> (String, String) {
        let summary = &report.progress_summary;
        let subject = format!("NetFast Progress Report - Day {}", summary.days_completed);

        let mut body = format!(
            "Dear {},\n\n\
             Days completed: {} of {} ({}%)\n\
             Violations: {}\n",
            report.sponsor_contact.name,
            summary.days_completed,
            summary.total_days,
            summary.completion_percent(),
            summary.violation_count,
        );
        if let Some(last) = summary.last_violation {
            body.push_str(&format!("Last violation: {}\n", last.format("%Y-%m-%d %H:%M UTC")));
        }
        if !summary.strength_moments.is_empty() {
            body.push_str("\nStrength moments:\n");
            for moment in &summary.strength_moments {
                body.push_str(&format!(
                    "  - {} ({})\n",
                    moment.moment,
                    moment.timestamp.format("%Y-%m-%d")
                ));
            }
        }
        (subject, body)
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver_violation(&self, alert: &ViolationAlert) -> Result<()> {
        let (subject, body) = Self::render_violation(alert);
        info!(to = %alert.sponsor_contact.email, %subject, "{body}");
        Ok(())
    }

    async fn deliver_progress(&self, report: &ProgressReport) -> Result<()> {
        let (subject, body) = Self::render_progress(report);
        info!(to = %report.sponsor_contact.email, %subject, "{body}");
        Ok(())
    }
}

/// Posts notifications to the accountability backend
#[derive(Clone)]
pub struct ApiSink {
    inner: Arc<ApiInner>,
}

struct ApiInner {
    http: HttpClient,
    base_url: Url,
    token: String,
    device_id: String,
}

#[derive(Serialize)]
struct ViolationBody<'a> {
    device_id: &'a str,
    #[serde(rename = "type")]
    kind: netfast_core::ViolationType,
    details: serde_json::Value,
}

#[derive(Serialize)]
struct ReportBody {
    days_completed: u32,
    violation_count: u32,
}

impl ApiSink {
    /// Sink for the configured backend
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(format!("netfast/{}", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .build()
            .map_err(|e| FilterError::Notify(format!("failed to build HTTP client: {e}")))?;

        // Endpoints are joined relative to the base, so keep its path as a directory
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            inner: Arc::new(ApiInner {
                http,
                base_url,
                token: config.token.clone(),
                device_id: config.device_id.clone(),
            }),
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<()> {
        let url = self
            .inner
            .base_url
            .join(path)
            .map_err(|e| FilterError::Notify(format!("invalid endpoint {path}: {e}")))?;
        debug!(url = %url, "POST request");

        let response = self
            .inner
            .http
            .post(url)
            .bearer_auth(&self.inner.token)
            .json(body)
            .send()
            .await
            .map_err(|e| FilterError::Notify(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);
        Err(FilterError::Notify(format!("{}: {message}", status.as_u16())))
    }
}

#[async_trait]
impl NotificationSink for ApiSink {
    async fn deliver_violation(&self, alert: &ViolationAlert) -> Result<()> {
        let body = ViolationBody {
            device_id: &self.inner.device_id,
            kind: alert.violation_type(),
            details: serde_json::json!({
                "reason": alert.violation_reason,
                "timestamp": alert.timestamp,
                "sponsor": alert.sponsor_contact.email,
            }),
        };
        self.post("api/violations", &body).await
    }

    async fn deliver_progress(&self, report: &ProgressReport) -> Result<()> {
        let body = ReportBody {
            days_completed: report.progress_summary.days_completed,
            violation_count: report.progress_summary.violation_count,
        };
        self.post("api/reports", &body).await
    }
}

#[derive(Debug, Clone)]
struct ProgressData {
    start_date: DateTime<Utc>,
    violation_count: u32,
    last_violation: Option<DateTime<Utc>>,
    strength_moments: VecDeque<StrengthMoment>,
}

/// Records progress and hands notifications to the sink
pub struct AccountabilityNotifier {
    sponsor: Option<SponsorContact>,
    sink: Arc<dyn NotificationSink>,
    progress: Mutex<ProgressData>,
    total_days: u32,
}

impl std::fmt::Debug for AccountabilityNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountabilityNotifier")
            .field("sponsor", &self.sponsor)
            .field("total_days", &self.total_days)
            .finish_non_exhaustive()
    }
}

impl AccountabilityNotifier {
    /// Start tracking a fast beginning now.
    pub fn new(
        sponsor: Option<SponsorContact>,
        sink: Arc<dyn NotificationSink>,
        total_days: u32,
    ) -> Self {
        Self::starting_at(sponsor, sink, total_days, Utc::now())
    }

    /// Start tracking a fast that began at `start_date`.
    pub fn starting_at(
        sponsor: Option<SponsorContact>,
        sink: Arc<dyn NotificationSink>,
        total_days: u32,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            sponsor,
            sink,
            progress: Mutex::new(ProgressData {
                start_date,
                violation_count: 0,
                last_violation: None,
                strength_moments: VecDeque::new(),
            }),
            total_days,
        }
    }

    /// Record the violation and deliver the alert.
    ///
    /// Without a sponsor the violation is recorded and nothing is sent.
    #[instrument(skip(self), fields(reason = %event.reason))]
    pub async fn notify_violation(&self, event: &ViolationEvent) -> Result<()> {
        let Some(alert) = self.record_violation(event) else {
            debug!("no sponsor configured, skipping violation alert");
            return Ok(());
        };
        self.sink.deliver_violation(&alert).await
    }

    /// Record the violation now and deliver the alert in the background.
    ///
    /// One attempt; a failure is logged and dropped.
    pub fn dispatch_violation(&self, event: &ViolationEvent) -> Option<JoinHandle<()>> {
        let Some(alert) = self.record_violation(event) else {
            debug!("no sponsor configured, skipping violation alert");
            return None;
        };

        let sink = Arc::clone(&self.sink);
        Some(tokio::spawn(async move {
            if let Err(e) = sink.deliver_violation(&alert).await {
                warn!(error = %e, "violation alert delivery failed");
            }
        }))
    }

    /// Record a neutral data point.
    ///
    /// The same moment is kept once per day, and at most
    /// [`MAX_STRENGTH_MOMENTS`] are held.
    pub fn add_strength_moment(&self, moment: impl Into<String>) {
        let moment = StrengthMoment {
            moment: moment.into(),
            timestamp: Utc::now(),
        };
        let today = moment.timestamp.date_naive();

        let mut data = self.progress_lock();
        let seen_today = data
            .strength_moments
            .iter()
            .rev()
            .take_while(|m| m.timestamp.date_naive() == today)
            .any(|m| m.moment == moment.moment);
        if seen_today {
            return;
        }

        debug!(moment = %moment.moment, "strength moment");
        if data.strength_moments.len() >= MAX_STRENGTH_MOMENTS {
            data.strength_moments.pop_front();
        }
        data.strength_moments.push_back(moment);
    }

    /// Progress so far
    pub fn progress(&self) -> ProgressSummary {
        let data = self.progress_lock();
        let elapsed = (Utc::now() - data.start_date).num_days().max(0);
        ProgressSummary {
            days_completed: u32::try_from(elapsed).unwrap_or(u32::MAX),
            total_days: self.total_days,
            violation_count: data.violation_count,
            last_violation: data.last_violation,
            strength_moments: data.strength_moments.iter().cloned().collect(),
        }
    }

    /// Deliver a progress report to the sponsor.
    ///
    /// Returns `None` when no sponsor is configured.
    pub async fn send_progress_report(&self) -> Result<Option<ProgressReport>> {
        let Some(sponsor) = self.sponsor.clone() else {
            return Ok(None);
        };
        let report = ProgressReport {
            sponsor_contact: sponsor,
            progress_summary: self.progress(),
            timestamp: Utc::now(),
        };
        self.sink.deliver_progress(&report).await?;
        Ok(Some(report))
    }

    fn record_violation(&self, event: &ViolationEvent) -> Option<ViolationAlert> {
        {
            let mut data = self.progress_lock();
            data.violation_count += 1;
            data.last_violation = Some(event.timestamp);
        }
        self.sponsor
            .clone()
            .map(|sponsor| ViolationAlert::new(sponsor, event))
    }

    fn progress_lock(&self) -> MutexGuard<'_, ProgressData> {
        self.progress
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use wiremock::matchers::{bearer_token, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sponsor() -> SponsorContact {
        SponsorContact {
            name: "Sam".into(),
            email: "sam@example.com".into(),
        }
    }

    fn api_config(server: &MockServer) -> ApiConfig {
        ApiConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            token: "secret".into(),
            device_id: "laptop-1".into(),
        }
    }

    #[test]
    fn test_render_violation() {
        let alert = ViolationAlert::new(sponsor(), &ViolationEvent::dns_modified());
        let (subject, body) = LogSink::render_violation(&alert);
        assert_eq!(subject, VIOLATION_SUBJECT);
        assert!(body.starts_with("Dear Sam,"));
        assert!(body.contains("DNS settings were modified"));
    }

    #[test]
    fn test_render_progress() {
        let report = ProgressReport {
            sponsor_contact: sponsor(),
            progress_summary: ProgressSummary {
                days_completed: 12,
                total_days: 40,
                violation_count: 1,
                last_violation: Some(Utc::now()),
                strength_moments: vec![StrengthMoment {
                    moment: "Closed firefox".into(),
                    timestamp: Utc::now(),
                }],
            },
            timestamp: Utc::now(),
        };
        let (subject, body) = LogSink::render_progress(&report);
        assert_eq!(subject, "NetFast Progress Report - Day 12");
        assert!(body.contains("12 of 40 (30%)"));
        assert!(body.contains("Closed firefox"));
    }

    #[tokio::test]
    async fn test_violation_without_sponsor_is_recorded_not_sent() {
        let sink = Arc::new(RecordingSink::default());
        let notifier = AccountabilityNotifier::new(None, sink.clone(), 40);

        notifier
            .notify_violation(&ViolationEvent::vpn_detected())
            .await
            .unwrap();
        assert!(notifier.dispatch_violation(&ViolationEvent::vpn_detected()).is_none());

        assert_eq!(notifier.progress().violation_count, 2);
        assert!(sink.violations().is_empty());
        assert!(notifier.send_progress_report().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failure() {
        let sink = Arc::new(RecordingSink::failing());
        let notifier = AccountabilityNotifier::new(Some(sponsor()), sink.clone(), 40);

        let handle = notifier
            .dispatch_violation(&ViolationEvent::dns_modified())
            .unwrap();
        handle.await.unwrap();
        assert_eq!(sink.violations().len(), 1);
        assert!(notifier.progress().last_violation.is_some());
    }

    #[tokio::test]
    async fn test_progress_days_completed() {
        let sink = Arc::new(RecordingSink::default());
        let start = Utc::now() - chrono::Duration::days(10) - chrono::Duration::hours(2);
        let notifier = AccountabilityNotifier::starting_at(Some(sponsor()), sink.clone(), 40, start);
        notifier.add_strength_moment("Chose not to open chrome");

        let report = notifier.send_progress_report().await.unwrap().unwrap();
        assert_eq!(report.progress_summary.days_completed, 10);
        assert_eq!(report.progress_summary.completion_percent(), 25);
        assert_eq!(report.progress_summary.strength_moments.len(), 1);
        assert_eq!(sink.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_api_sink_posts_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/violations"))
            .and(bearer_token("secret"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ApiSink::new(&api_config(&server)).unwrap();
        let alert = ViolationAlert::new(sponsor(), &ViolationEvent::vpn_detected());
        sink.deliver_violation(&alert).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["device_id"], "laptop-1");
        assert_eq!(body["type"], "vpn_usage");
        assert_eq!(body["details"]["reason"], "VPN/Proxy connection detected");
    }

    #[test]
    fn test_repeated_moment_kept_once_per_day() {
        let notifier = AccountabilityNotifier::new(None, Arc::new(RecordingSink::default()), 40);
        // A day of once-a-minute samples for the same browser
        for _ in 0..24 * 60 {
            notifier.add_strength_moment("Browser running: firefox");
        }
        notifier.add_strength_moment("Browser running: chrome");

        let moments = notifier.progress().strength_moments;
        assert_eq!(moments.len(), 2);
        assert_eq!(moments[1].moment, "Browser running: chrome");
    }

    #[test]
    fn test_strength_moments_are_capped() {
        let notifier = AccountabilityNotifier::new(None, Arc::new(RecordingSink::default()), 40);
        let total = 40 * 24 * 60;
        for i in 0..total {
            notifier.add_strength_moment(format!("moment {i}"));
        }

        let moments = notifier.progress().strength_moments;
        assert_eq!(moments.len(), MAX_STRENGTH_MOMENTS);
        assert_eq!(moments[0].moment, format!("moment {}", total - MAX_STRENGTH_MOMENTS));
        assert_eq!(moments.last().unwrap().moment, format!("moment {}", total - 1));
    }

    #[tokio::test]
    async fn test_api_sink_keeps_base_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/netfast/api/violations"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = api_config(&server);
        config.base_url = Url::parse(&format!("{}/netfast", server.uri())).unwrap();
        let sink = ApiSink::new(&config).unwrap();
        let alert = ViolationAlert::new(sponsor(), &ViolationEvent::dns_modified());
        sink.deliver_violation(&alert).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_sink_posts_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/reports"))
            .and(body_json(serde_json::json!({"days_completed": 3, "violation_count": 0})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ApiSink::new(&api_config(&server)).unwrap();
        let report = ProgressReport {
            sponsor_contact: sponsor(),
            progress_summary: ProgressSummary {
                days_completed: 3,
                total_days: 40,
                violation_count: 0,
                last_violation: None,
                strength_moments: Vec::new(),
            },
            timestamp: Utc::now(),
        };
        sink.deliver_progress(&report).await.unwrap();
    }

    #[tokio::test]
    async fn test_api_sink_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/violations"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"error": "Invalid token"})),
            )
            .mount(&server)
            .await;

        let sink = ApiSink::new(&api_config(&server)).unwrap();
        let alert = ViolationAlert::new(sponsor(), &ViolationEvent::dns_modified());
        let err = sink.deliver_violation(&alert).await.unwrap_err();
        assert!(matches!(err, FilterError::Notify(msg) if msg == "401: Invalid token"));
    }
}
