//! Webhook alert delivery
//!
//! Posts alerts as compact JSON to a configured endpoint. The payload
//! carries a Slack-compatible `text` field plus the structured alert
//! fields, so both chat webhooks and custom receivers can consume it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::alerts::AlertSink;
use crate::domain::{Alert, VerificationReport};
use crate::error::{LinewatchError, Result};

const REQUEST_TIMEOUT_SECS: u64 = 10;

pub struct WebhookSink {
    http: Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(url: String) -> Result<Self> {
        let url = Url::parse(&url)
            .map_err(|e| LinewatchError::Validation(format!("invalid webhook URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LinewatchError::Validation(format!(
                "webhook URL must be http(s), got {}",
                url.scheme()
            )));
        }

        let http = Client::builder()
            .user_agent(concat!("linewatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { http, url })
    }

    /// Build from `LINEWATCH_WEBHOOK_URL`. Absent variable means no
    /// webhook sink; a malformed value is a configuration error.
    pub fn from_env() -> Result<Option<Arc<Self>>> {
        match std::env::var("LINEWATCH_WEBHOOK_URL") {
            Ok(url) => {
                info!("webhook notifications enabled");
                Ok(Some(Arc::new(Self::new(url)?)))
            }
            Err(_) => Ok(None),
        }
    }

    fn build_payload(alert: &Alert, report: Option<&VerificationReport>) -> serde_json::Value {
        json!({
            "text": alert.message,
            "alert_id": alert.id.to_string(),
            "kind": alert.kind.as_str(),
            "priority": alert.priority.as_str(),
            "game_id": alert.game_id,
            "market": alert.market.as_str(),
            "confidence": alert.confidence.as_str(),
            "profit_pct": alert.profit_potential * 100.0,
            "time_sensitivity": alert.time_sensitivity.as_str(),
            "verification": report.map(|r| r.outcome.as_str()).unwrap_or("skipped"),
            "expires_at": alert.expires_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, alert: &Alert, report: Option<&VerificationReport>) -> Result<()> {
        let payload = Self::build_payload(alert, report);

        let response = self
            .http
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| LinewatchError::SinkFailure {
                sink: "webhook".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(alert_id = %alert.id, "webhook notification sent");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(LinewatchError::SinkFailure {
                sink: "webhook".to_string(),
                reason: format!("HTTP {}: {}", status, body),
            })
        }
    }
}
