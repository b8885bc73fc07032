use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::info;

/// Metrics collector for observability
///
/// Counters only ever go up. The two gauges are overwritten from the
/// monitor's stats at scrape time so the exported snapshot cannot drift
/// from the monitor's own view.
pub struct Metrics {
    /// Completed scan cycles
    pub scans: AtomicU64,
    /// Book quotes fetched from the odds feed
    pub quotes_fetched: AtomicU64,
    /// Quotes discarded for exceeding the data-age ceiling
    pub stale_quotes: AtomicU64,
    /// Market discrepancies found by the scanner
    pub opportunities: AtomicU64,
    /// Alerts built from discrepancies
    pub alerts_generated: AtomicU64,
    /// Alerts delivered to at least one sink
    pub alerts_dispatched: AtomicU64,
    /// Alerts cancelled by final verification
    pub alerts_cancelled: AtomicU64,
    /// Alerts suppressed by cooldown or an active duplicate
    pub alerts_suppressed: AtomicU64,
    /// Alerts dropped because the verification queue was full
    pub queue_dropped: AtomicU64,
    /// Verifications that ended in a feed error
    pub verification_errors: AtomicU64,
    /// Failed sink deliveries
    pub sink_errors: AtomicU64,
    /// Currently tracked unexpired alerts (gauge)
    pub active_alerts: AtomicU64,
    /// Alerts waiting for verification (gauge)
    pub queue_depth: AtomicU64,
    /// Wall-clock time of the last completed scan
    last_scan: RwLock<Option<DateTime<Utc>>>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            scans: AtomicU64::new(0),
            quotes_fetched: AtomicU64::new(0),
            stale_quotes: AtomicU64::new(0),
            opportunities: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            alerts_dispatched: AtomicU64::new(0),
            alerts_cancelled: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            queue_dropped: AtomicU64::new(0),
            verification_errors: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            active_alerts: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            last_scan: RwLock::new(None),
        }
    }

    /// Mark one completed scan cycle and stamp its wall-clock time
    pub async fn mark_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        *self.last_scan.write().await = Some(Utc::now());
    }

    pub fn add_quotes_fetched(&self, n: u64) {
        self.quotes_fetched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_stale_quotes(&self, n: u64) {
        self.stale_quotes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_opportunities(&self, n: u64) {
        self.opportunities.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_alerts_generated(&self) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_dispatched(&self) {
        self.alerts_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_cancelled(&self) {
        self.alerts_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_alerts_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queue_dropped(&self) {
        self.queue_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_verification_errors(&self) {
        self.verification_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_sink_errors(&self, n: u64) {
        self.sink_errors.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_active_alerts(&self, n: u64) {
        self.active_alerts.store(n, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, n: u64) {
        self.queue_depth.store(n, Ordering::Relaxed);
    }

    pub async fn last_scan(&self) -> Option<DateTime<Utc>> {
        *self.last_scan.read().await
    }

    /// True when no scan has completed within `max_age_secs` of `now`.
    /// A process that has never scanned counts as stale.
    pub async fn scan_is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        match *self.last_scan.read().await {
            Some(at) => (now - at).num_seconds() > max_age_secs as i64,
            None => true,
        }
    }

    /// Get current metrics as a formatted string
    pub async fn summary(&self) -> String {
        let last_scan = match *self.last_scan.read().await {
            Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "never".to_string(),
        };

        format!(
            r#"
=== LINEWATCH STATUS ===
Scans: {} (last: {})
Quotes: {} fetched | {} stale discarded
Discrepancies: {}
Alerts: {} generated | {} dispatched | {} cancelled | {} suppressed
Queue: depth {} | {} dropped
Errors: {} verification | {} sink
========================
"#,
            self.scans.load(Ordering::Relaxed),
            last_scan,
            self.quotes_fetched.load(Ordering::Relaxed),
            self.stale_quotes.load(Ordering::Relaxed),
            self.opportunities.load(Ordering::Relaxed),
            self.alerts_generated.load(Ordering::Relaxed),
            self.alerts_dispatched.load(Ordering::Relaxed),
            self.alerts_cancelled.load(Ordering::Relaxed),
            self.alerts_suppressed.load(Ordering::Relaxed),
            self.queue_depth.load(Ordering::Relaxed),
            self.queue_dropped.load(Ordering::Relaxed),
            self.verification_errors.load(Ordering::Relaxed),
            self.sink_errors.load(Ordering::Relaxed),
        )
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        format!(
            r#"# HELP linewatch_scans_total Completed scan cycles
# TYPE linewatch_scans_total counter
linewatch_scans_total {}

# HELP linewatch_quotes_fetched_total Book quotes fetched from the odds feed
# TYPE linewatch_quotes_fetched_total counter
linewatch_quotes_fetched_total {}

# HELP linewatch_stale_quotes_total Quotes discarded for exceeding the data-age ceiling
# TYPE linewatch_stale_quotes_total counter
linewatch_stale_quotes_total {}

# HELP linewatch_opportunities_total Market discrepancies found by the scanner
# TYPE linewatch_opportunities_total counter
linewatch_opportunities_total {}

# HELP linewatch_alerts_generated_total Alerts built from discrepancies
# TYPE linewatch_alerts_generated_total counter
linewatch_alerts_generated_total {}

# HELP linewatch_alerts_dispatched_total Alerts delivered to at least one sink
# TYPE linewatch_alerts_dispatched_total counter
linewatch_alerts_dispatched_total {}

# HELP linewatch_alerts_cancelled_total Alerts cancelled by final verification
# TYPE linewatch_alerts_cancelled_total counter
linewatch_alerts_cancelled_total {}

# HELP linewatch_alerts_suppressed_total Alerts suppressed by cooldown or an active duplicate
# TYPE linewatch_alerts_suppressed_total counter
linewatch_alerts_suppressed_total {}

# HELP linewatch_queue_dropped_total Alerts dropped because the verification queue was full
# TYPE linewatch_queue_dropped_total counter
linewatch_queue_dropped_total {}

# HELP linewatch_verification_errors_total Verifications that ended in a feed error
# TYPE linewatch_verification_errors_total counter
linewatch_verification_errors_total {}

# HELP linewatch_sink_errors_total Failed sink deliveries
# TYPE linewatch_sink_errors_total counter
linewatch_sink_errors_total {}

# HELP linewatch_active_alerts Currently tracked unexpired alerts
# TYPE linewatch_active_alerts gauge
linewatch_active_alerts {}

# HELP linewatch_queue_depth Alerts waiting for verification
# TYPE linewatch_queue_depth gauge
linewatch_queue_depth {}
"#,
            self.scans.load(Ordering::Relaxed),
            self.quotes_fetched.load(Ordering::Relaxed),
            self.stale_quotes.load(Ordering::Relaxed),
            self.opportunities.load(Ordering::Relaxed),
            self.alerts_generated.load(Ordering::Relaxed),
            self.alerts_dispatched.load(Ordering::Relaxed),
            self.alerts_cancelled.load(Ordering::Relaxed),
            self.alerts_suppressed.load(Ordering::Relaxed),
            self.queue_dropped.load(Ordering::Relaxed),
            self.verification_errors.load(Ordering::Relaxed),
            self.sink_errors.load(Ordering::Relaxed),
            self.active_alerts.load(Ordering::Relaxed),
            self.queue_depth.load(Ordering::Relaxed),
        )
    }

    /// Log periodic status
    pub async fn log_status(&self) {
        info!("{}", self.summary().await);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
