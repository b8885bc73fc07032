//! Health check HTTP server for unattended monitoring
//!
//! Provides liveness and readiness probes for process supervision
//! (systemd/launchd), a Prometheus metrics endpoint, and a small
//! read-only view of the live alert table.

use crate::domain::AlertPriority;
use crate::error::{LinewatchError, Result};
use crate::monitor::{ActiveAlert, Monitor, MonitorStats};
use crate::services::Metrics;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

/// A scan is overdue after this many missed intervals
const SCAN_OVERDUE_INTERVALS: u64 = 3;

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

/// Overall system health response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
    pub stats: MonitorStats,
}

/// Shared state for the ops endpoints
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub metrics: Arc<Metrics>,
    pub scan_interval_secs: u64,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>, metrics: Arc<Metrics>, scan_interval_secs: u64) -> Self {
        Self {
            monitor,
            metrics,
            scan_interval_secs,
        }
    }

    /// Seconds without a completed scan before the loop counts as overdue
    fn scan_overdue_after(&self) -> u64 {
        self.scan_interval_secs * SCAN_OVERDUE_INTERVALS
    }

    /// Get overall health status
    pub async fn health(&self) -> HealthResponse {
        let now = Utc::now();
        let stats = self.monitor.stats().await;
        let running = self.monitor.is_running();
        let last_scan = self.metrics.last_scan().await;

        let mut components = Vec::new();
        let mut overall = HealthStatus::Healthy;

        // Monitor: a stopped monitor is a hard failure
        let monitor_status = if running {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        if monitor_status == HealthStatus::Unhealthy {
            overall = HealthStatus::Unhealthy;
        }
        components.push(ComponentHealth {
            name: "monitor".to_string(),
            status: monitor_status,
            message: if running {
                None
            } else {
                Some("not running".to_string())
            },
            last_check: None,
        });

        // Scan loop: overdue scans degrade before they fail
        let overdue = self
            .metrics
            .scan_is_stale(now, self.scan_overdue_after())
            .await;
        let scan_status = match (running, overdue) {
            (_, false) => HealthStatus::Healthy,
            (true, true) => HealthStatus::Degraded,
            (false, true) => HealthStatus::Unhealthy,
        };
        if scan_status == HealthStatus::Unhealthy {
            overall = HealthStatus::Unhealthy;
        } else if scan_status == HealthStatus::Degraded && overall == HealthStatus::Healthy {
            overall = HealthStatus::Degraded;
        }
        components.push(ComponentHealth {
            name: "scan_loop".to_string(),
            status: scan_status,
            message: if overdue {
                Some(match last_scan {
                    Some(at) => format!("last scan {}s ago", (now - at).num_seconds()),
                    None => "no scan completed yet".to_string(),
                })
            } else {
                None
            },
            last_check: last_scan,
        });

        HealthResponse {
            status: overall,
            timestamp: now,
            uptime_seconds: stats.uptime_secs.max(0) as u64,
            components,
            stats,
        }
    }
}

/// Build the ops router. Split from `HealthServer::run` so tests can
/// drive it with `tower::ServiceExt::oneshot`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/alerts", get(alerts_handler))
        .route("/alerts/:id/ack", post(ack_handler))
        .with_state(state)
        .layer(cors)
}

/// Health check server
pub struct HealthServer {
    state: AppState,
    port: u16,
}

impl HealthServer {
    pub fn new(state: AppState, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until the process exits
    pub async fn run(&self) -> Result<()> {
        let app = router(self.state.clone());

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("starting health server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| LinewatchError::Internal(format!("health server error: {}", e)))?;

        Ok(())
    }
}

/// Full health check endpoint
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health().await;
    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // still serving traffic
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Liveness probe: the process is up
async fn liveness_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: the monitor is running and scanning on schedule
async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    let overdue = state
        .metrics
        .scan_is_stale(Utc::now(), state.scan_overdue_after())
        .await;
    if state.monitor.is_running() && !overdue {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.health().await;
    // Sync the gauge with the monitor's view before rendering
    state
        .metrics
        .set_active_alerts(health.stats.active_alert_count as u64);

    let up = match health.status {
        HealthStatus::Healthy => 1,
        HealthStatus::Degraded => 0,
        HealthStatus::Unhealthy => -1,
    };

    let body = format!(
        r#"# HELP linewatch_up Health status (1=healthy, 0=degraded, -1=unhealthy)
# TYPE linewatch_up gauge
linewatch_up {}

# HELP linewatch_uptime_seconds Uptime in seconds
# TYPE linewatch_uptime_seconds counter
linewatch_uptime_seconds {}

{}"#,
        up,
        health.uptime_seconds,
        state.metrics.prometheus(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        body,
    )
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    min_priority: Option<String>,
}

/// Live alerts, strongest first, optionally filtered by `?min_priority=`
async fn alerts_handler(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> std::result::Result<Json<Vec<ActiveAlert>>, (StatusCode, String)> {
    let floor = match query.min_priority.as_deref() {
        Some(raw) => Some(
            raw.parse::<AlertPriority>()
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        ),
        None => None,
    };
    Ok(Json(state.monitor.active_alerts(floor).await))
}

/// Acknowledge an active alert by id
async fn ack_handler(State(state): State<AppState>, Path(alert_id): Path<Uuid>) -> StatusCode {
    if state.monitor.acknowledge(alert_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
