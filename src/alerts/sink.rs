//! Alert delivery sinks
//!
//! Sinks are fire-and-forget: dispatch fans an alert out to every
//! configured sink concurrently, and one sink failing never blocks or
//! cancels the others.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::adapters::WebhookSink;
use crate::config::AlertsConfig;
use crate::domain::{Alert, AlertPriority, VerificationReport};
use crate::error::Result;

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short identifier for logs and failure reports
    fn name(&self) -> &str;

    /// Deliver one alert. The verification report is attached when the
    /// alert passed through the final pre-dispatch check.
    async fn notify(&self, alert: &Alert, report: Option<&VerificationReport>) -> Result<()>;
}

/// Swallows every alert. Used when delivery is disabled.
pub struct NullAlertSink;

#[async_trait]
impl AlertSink for NullAlertSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn notify(&self, _alert: &Alert, _report: Option<&VerificationReport>) -> Result<()> {
        Ok(())
    }
}

/// Writes alerts to the structured log, level keyed to priority.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &Alert, report: Option<&VerificationReport>) -> Result<()> {
        let verification = report.map(|r| r.outcome.as_str()).unwrap_or("skipped");
        match alert.priority {
            AlertPriority::Critical | AlertPriority::High => warn!(
                alert_id = %alert.id,
                kind = %alert.kind,
                priority = %alert.priority,
                game_id = %alert.game_id,
                market = %alert.market,
                profit_pct = format!("{:.2}", alert.profit_potential * 100.0),
                verification,
                "{}",
                alert.message
            ),
            AlertPriority::Medium | AlertPriority::Low => info!(
                alert_id = %alert.id,
                kind = %alert.kind,
                priority = %alert.priority,
                game_id = %alert.game_id,
                market = %alert.market,
                profit_pct = format!("{:.2}", alert.profit_potential * 100.0),
                verification,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Assemble the sink set from config. The log sink is always present;
/// a webhook sink joins it when a URL is configured or exported as
/// `LINEWATCH_WEBHOOK_URL`.
pub fn build_sinks(config: &AlertsConfig) -> Result<Vec<Arc<dyn AlertSink>>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
    let webhook = match &config.webhook_url {
        Some(url) => Some(Arc::new(WebhookSink::new(url.clone())?)),
        None => WebhookSink::from_env()?,
    };
    if let Some(webhook) = webhook {
        sinks.push(webhook);
    }
    Ok(sinks)
}

/// Fan an alert out to all sinks concurrently. Returns the number of
/// sinks that accepted it; failures are logged and dropped.
pub async fn dispatch_all(
    sinks: &[Arc<dyn AlertSink>],
    alert: &Alert,
    report: Option<&VerificationReport>,
) -> usize {
    let deliveries = sinks.iter().map(|sink| {
        let sink = Arc::clone(sink);
        async move {
            match sink.notify(alert, report).await {
                Ok(()) => true,
                Err(err) => {
                    error!(
                        sink = sink.name(),
                        alert_id = %alert.id,
                        error = %err,
                        "alert delivery failed"
                    );
                    false
                }
            }
        }
    });

    futures::future::join_all(deliveries)
        .await
        .into_iter()
        .filter(|delivered| *delivered)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AlertKind, AlertPayload, ConfidenceLevel, MarketKind, TimeSensitivity, ValueOpportunity,
    };
    use crate::error::LinewatchError;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn sample_alert() -> Alert {
        let now = Utc::now();
        Alert {
            id: Uuid::new_v4(),
            kind: AlertKind::Value,
            priority: AlertPriority::Medium,
            game_id: "game-1".to_string(),
            market: MarketKind::Moneyline,
            confidence: ConfidenceLevel::Medium,
            profit_potential: 0.08,
            payload: AlertPayload::Value {
                primary: ValueOpportunity {
                    outcome: "Lakers".to_string(),
                    sportsbook: "fanduel".to_string(),
                    offered_odds: 130.0,
                    consensus_odds: -100.0,
                    implied_edge: 0.08,
                    suggested_stake: 0.04,
                    confidence: ConfidenceLevel::Medium,
                },
                additional: Vec::new(),
            },
            time_sensitivity: TimeSensitivity::Short,
            message: "value edge".to_string(),
            created_at: now,
            expires_at: now + ChronoDuration::seconds(1800),
            acknowledged: false,
        }
    }

    struct RecordingSink {
        seen: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, alert: &Alert, _report: Option<&VerificationReport>) -> Result<()> {
            self.seen.lock().unwrap().push(alert.id);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn notify(
            &self,
            _alert: &Alert,
            _report: Option<&VerificationReport>,
        ) -> Result<()> {
            Err(LinewatchError::SinkFailure {
                sink: "failing".to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_sinks() {
        let recorder = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let sinks: Vec<Arc<dyn AlertSink>> =
            vec![Arc::new(NullAlertSink), recorder.clone(), Arc::new(LogAlertSink)];

        let alert = sample_alert();
        let delivered = dispatch_all(&sinks, &alert, None).await;

        assert_eq!(delivered, 3);
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), &[alert.id]);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let recorder = Arc::new(RecordingSink {
            seen: Mutex::new(Vec::new()),
        });
        let sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(FailingSink), recorder.clone()];

        let alert = sample_alert();
        let delivered = dispatch_all(&sinks, &alert, None).await;

        assert_eq!(delivered, 1);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    // Serializes the tests that touch LINEWATCH_WEBHOOK_URL
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_env(key: &str, value: Option<&str>) {
        match value {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }

    #[tokio::test]
    async fn test_build_sinks_log_only_by_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        let prev = std::env::var("LINEWATCH_WEBHOOK_URL").ok();
        set_env("LINEWATCH_WEBHOOK_URL", None);

        let sinks = build_sinks(&AlertsConfig::default()).unwrap();
        assert_eq!(sinks.len(), 1);
        assert_eq!(sinks[0].name(), "log");

        set_env("LINEWATCH_WEBHOOK_URL", prev.as_deref());
    }

    #[tokio::test]
    async fn test_build_sinks_webhook_from_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        let prev = std::env::var("LINEWATCH_WEBHOOK_URL").ok();
        set_env(
            "LINEWATCH_WEBHOOK_URL",
            Some("https://hooks.example.com/from-env"),
        );

        let sinks = build_sinks(&AlertsConfig::default()).unwrap();
        assert_eq!(sinks.len(), 2);
        assert_eq!(sinks[1].name(), "webhook");

        // A malformed exported URL is a setup error, not a silent skip
        set_env("LINEWATCH_WEBHOOK_URL", Some("not a url"));
        assert!(build_sinks(&AlertsConfig::default()).is_err());

        set_env("LINEWATCH_WEBHOOK_URL", prev.as_deref());
    }

    #[tokio::test]
    async fn test_build_sinks_with_webhook() {
        let config = AlertsConfig {
            webhook_url: Some("https://hooks.example.com/linewatch".to_string()),
            ..AlertsConfig::default()
        };
        let sinks = build_sinks(&config).unwrap();
        assert_eq!(sinks.len(), 2);
        assert_eq!(sinks[1].name(), "webhook");
    }

    #[tokio::test]
    async fn test_build_sinks_rejects_bad_url() {
        let config = AlertsConfig {
            webhook_url: Some("not a url".to_string()),
            ..AlertsConfig::default()
        };
        assert!(build_sinks(&config).is_err());
    }
}
