//! Background scan and alert lifecycle service
//!
//! Runs two tasks: a periodic scan loop that turns discrepancies into
//! alerts, and a worker that verifies and dispatches them. The two are
//! connected by a bounded queue; overflow drops the newest alert. At most
//! one active alert exists per (game, market, kind) key, enforced by the
//! active table plus a per-key cooldown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::{dispatch_all, AlertFactory, AlertSink};
use crate::config::AppConfig;
use crate::detector::DiscrepancyScanner;
use crate::domain::{
    Alert, AlertKey, AlertPriority, AlertStatus, VerificationOutcome, VerificationReport,
};
use crate::services::Metrics;
use crate::verifier::FinalVerifier;

/// Scan cycles between periodic status banners
const STATUS_LOG_EVERY: u64 = 10;

/// Counters and gauges exposed by `Monitor::stats`
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStats {
    pub scan_count: u64,
    pub alerts_generated: u64,
    pub alerts_verified: u64,
    pub alerts_cancelled_by_verification: u64,
    pub alerts_suppressed: u64,
    pub queue_dropped: u64,
    pub stale_quotes_discarded: u64,
    pub active_alert_count: usize,
    pub uptime_secs: i64,
}

/// An alert the monitor is currently tracking
#[derive(Debug, Clone, Serialize)]
pub struct ActiveAlert {
    pub alert: Alert,
    pub status: AlertStatus,
    pub verification: Option<VerificationReport>,
}

/// Shared tables the scan loop and alert worker both touch
struct MonitorState {
    cooldowns: RwLock<HashMap<AlertKey, DateTime<Utc>>>,
    active: RwLock<HashMap<AlertKey, ActiveAlert>>,
    stats: RwLock<MonitorStats>,
    started_at: RwLock<Option<DateTime<Utc>>>,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            cooldowns: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            stats: RwLock::new(MonitorStats::default()),
            started_at: RwLock::new(None),
        }
    }

    /// Key already active, or fired within the cooldown window
    async fn is_suppressed(
        &self,
        key: &AlertKey,
        now: DateTime<Utc>,
        cooldown: ChronoDuration,
    ) -> bool {
        if self.active.read().await.contains_key(key) {
            return true;
        }
        self.cooldowns
            .read()
            .await
            .get(key)
            .map_or(false, |stamped| now - *stamped < cooldown)
    }

    async fn stamp_cooldown(&self, key: AlertKey, now: DateTime<Utc>) {
        self.cooldowns.write().await.insert(key, now);
    }

    async fn register_active(&self, key: AlertKey, alert: &Alert) {
        self.active.write().await.insert(
            key,
            ActiveAlert {
                alert: alert.clone(),
                status: AlertStatus::Pending,
                verification: None,
            },
        );
    }

    async fn mark_dispatched(&self, key: &AlertKey, report: VerificationReport) {
        if let Some(entry) = self.active.write().await.get_mut(key) {
            entry.status = AlertStatus::Dispatched;
            entry.verification = Some(report);
        }
    }

    async fn remove_active(&self, key: &AlertKey) {
        self.active.write().await.remove(key);
    }

    /// Drop expired active alerts and cooldown stamps past the window
    async fn prune(&self, now: DateTime<Utc>, cooldown: ChronoDuration) {
        {
            let mut active = self.active.write().await;
            let before = active.len();
            active.retain(|_, entry| !entry.alert.is_expired(now));
            let pruned = before - active.len();
            if pruned > 0 {
                debug!(pruned, "expired active alerts pruned");
            }
        }
        let mut cooldowns = self.cooldowns.write().await;
        cooldowns.retain(|_, stamped| now - *stamped < cooldown);
    }
}

pub struct Monitor {
    scanner: Arc<DiscrepancyScanner>,
    verifier: Arc<FinalVerifier>,
    factory: Arc<AlertFactory>,
    sinks: Vec<Arc<dyn AlertSink>>,
    metrics: Arc<Metrics>,
    scan_interval_secs: u64,
    cooldown: ChronoDuration,
    queue_capacity: usize,
    state: Arc<MonitorState>,
    running: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(
        scanner: Arc<DiscrepancyScanner>,
        verifier: Arc<FinalVerifier>,
        sinks: Vec<Arc<dyn AlertSink>>,
        metrics: Arc<Metrics>,
        config: &AppConfig,
    ) -> Self {
        Self {
            scanner,
            verifier,
            factory: Arc::new(AlertFactory::new(&config.alerts)),
            sinks,
            metrics,
            scan_interval_secs: config.scanner.scan_interval_secs,
            cooldown: ChronoDuration::seconds(config.alerts.alert_cooldown_secs as i64),
            queue_capacity: config.alerts.queue_capacity,
            state: Arc::new(MonitorState::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn the scan loop and alert worker. Idempotent while running.
    pub async fn start(&self, game_ids: Vec<String>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("monitor already running");
            return;
        }

        info!(
            games = game_ids.len(),
            interval_secs = self.scan_interval_secs,
            queue_capacity = self.queue_capacity,
            "starting monitor"
        );
        *self.state.started_at.write().await = Some(Utc::now());

        let (tx, rx) = mpsc::channel::<Alert>(self.queue_capacity);

        let scanner = self.scanner.clone();
        let factory = self.factory.clone();
        let verifier = self.verifier.clone();
        let metrics = self.metrics.clone();
        let state = self.state.clone();
        let running = self.running.clone();
        let cooldown = self.cooldown;
        let interval_secs = self.scan_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                Self::scan_cycle(
                    &scanner, &factory, &verifier, &metrics, &game_ids, &tx, &state, cooldown,
                )
                .await;
            }
            info!("scan loop stopped");
        });

        let verifier = self.verifier.clone();
        let sinks = self.sinks.clone();
        let metrics = self.metrics.clone();
        let state = self.state.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            Self::alert_worker(rx, &verifier, &sinks, &metrics, &state, &running).await;
            info!("alert worker stopped");
        });
    }

    /// Cooperative shutdown: the scan loop halts on its next tick, the
    /// worker drains nothing further, in-flight verification finishes but
    /// never dispatches.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("monitor stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Live alerts, strongest priority first. `min_priority` filters out
    /// anything weaker.
    pub async fn active_alerts(&self, min_priority: Option<AlertPriority>) -> Vec<ActiveAlert> {
        let now = Utc::now();
        let active = self.state.active.read().await;
        let mut alerts: Vec<ActiveAlert> = active
            .values()
            .filter(|entry| !entry.alert.is_expired(now))
            .filter(|entry| min_priority.map_or(true, |floor| entry.alert.priority >= floor))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            b.alert
                .priority
                .cmp(&a.alert.priority)
                .then_with(|| b.alert.created_at.cmp(&a.alert.created_at))
        });
        alerts
    }

    /// Mark an active alert acknowledged. Returns false when the id is
    /// unknown or already pruned.
    pub async fn acknowledge(&self, alert_id: Uuid) -> bool {
        let mut active = self.state.active.write().await;
        for entry in active.values_mut() {
            if entry.alert.id == alert_id {
                entry.alert.acknowledged = true;
                info!(alert_id = %alert_id, "alert acknowledged");
                return true;
            }
        }
        false
    }

    pub async fn stats(&self) -> MonitorStats {
        let mut stats = self.state.stats.read().await.clone();
        stats.active_alert_count = self.state.active.read().await.len();
        stats.uptime_secs = self
            .state
            .started_at
            .read()
            .await
            .map_or(0, |started| (Utc::now() - started).num_seconds().max(0));
        stats
    }

    #[allow(clippy::too_many_arguments)]
    async fn scan_cycle(
        scanner: &DiscrepancyScanner,
        factory: &AlertFactory,
        verifier: &FinalVerifier,
        metrics: &Metrics,
        game_ids: &[String],
        tx: &mpsc::Sender<Alert>,
        state: &MonitorState,
        cooldown: ChronoDuration,
    ) {
        let now = Utc::now();
        state.prune(now, cooldown).await;
        verifier.prune_cache(now);

        for game_id in game_ids {
            let outcome = match scanner.scan_game(game_id).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(game_id, error = %err, "scan failed");
                    continue;
                }
            };

            metrics.add_quotes_fetched(outcome.quotes_seen as u64);
            metrics.add_opportunities(outcome.discrepancies.len() as u64);
            if outcome.stale_discarded > 0 {
                metrics.add_stale_quotes(outcome.stale_discarded);
                let mut stats = state.stats.write().await;
                stats.stale_quotes_discarded += outcome.stale_discarded;
            }

            for discrepancy in &outcome.discrepancies {
                let Some(alert) = factory.build(discrepancy) else {
                    continue;
                };
                metrics.inc_alerts_generated();
                {
                    let mut stats = state.stats.write().await;
                    stats.alerts_generated += 1;
                }

                let key = alert.key();
                if state.is_suppressed(&key, Utc::now(), cooldown).await {
                    debug!(key = %key, "alert suppressed by active key or cooldown");
                    metrics.inc_alerts_suppressed();
                    let mut stats = state.stats.write().await;
                    stats.alerts_suppressed += 1;
                    continue;
                }

                match tx.try_send(alert) {
                    Ok(()) => {
                        // Stamp at enqueue so the next tick cannot requeue
                        // the key while the worker is still behind
                        state.stamp_cooldown(key, Utc::now()).await;
                    }
                    Err(TrySendError::Full(dropped)) => {
                        warn!(key = %dropped.key(), "alert queue full, dropping newest");
                        metrics.inc_queue_dropped();
                        let mut stats = state.stats.write().await;
                        stats.queue_dropped += 1;
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!("alert queue closed, ending scan cycle");
                        return;
                    }
                }
            }
        }

        metrics.set_queue_depth((tx.max_capacity() - tx.capacity()) as u64);
        metrics.mark_scan().await;
        if metrics.scans.load(Ordering::Relaxed) % STATUS_LOG_EVERY == 0 {
            metrics.log_status().await;
        }

        let mut stats = state.stats.write().await;
        stats.scan_count += 1;
    }

    async fn alert_worker(
        mut rx: mpsc::Receiver<Alert>,
        verifier: &FinalVerifier,
        sinks: &[Arc<dyn AlertSink>],
        metrics: &Metrics,
        state: &MonitorState,
        running: &AtomicBool,
    ) {
        while running.load(Ordering::SeqCst) {
            let Some(alert) = rx.recv().await else {
                break;
            };
            if !running.load(Ordering::SeqCst) {
                debug!(alert_id = %alert.id, "shutdown started, queued alert dropped");
                break;
            }

            let key = alert.key();
            state.stamp_cooldown(key.clone(), Utc::now()).await;
            state.register_active(key.clone(), &alert).await;

            let report = verifier.verify(&alert).await;
            if report.outcome == VerificationOutcome::Error {
                metrics.inc_verification_errors();
            }

            if !running.load(Ordering::SeqCst) {
                info!(alert_id = %alert.id, "shutdown during verification, dispatch suppressed");
                state.remove_active(&key).await;
                metrics.inc_alerts_suppressed();
                let mut stats = state.stats.write().await;
                stats.alerts_suppressed += 1;
                break;
            }

            if report.should_dispatch && !alert.is_expired(Utc::now()) {
                let delivered = dispatch_all(sinks, &alert, Some(&report)).await;
                if delivered < sinks.len() {
                    metrics.add_sink_errors((sinks.len() - delivered) as u64);
                }
                metrics.inc_alerts_dispatched();
                state.mark_dispatched(&key, report).await;
                let mut stats = state.stats.write().await;
                stats.alerts_verified += 1;
            } else {
                metrics.inc_alerts_cancelled();
                state.remove_active(&key).await;
                let mut stats = state.stats.write().await;
                stats.alerts_cancelled_by_verification += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ArbitrageDetector;
    use crate::domain::{
        AlertKind, AlertPayload, BookQuote, ConfidenceLevel, MarketKind, TimeSensitivity,
        ValueOpportunity, VerificationOutcome,
    };
    use crate::error::Result;
    use crate::execution::ExecutionModel;
    use crate::feed::{MockOddsProvider, OddsProvider};
    use crate::persistence::NullOpportunityLog;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn quote(book: &str, outcome: &str, odds_value: f64) -> BookQuote {
        BookQuote::new(book, MarketKind::Moneyline, outcome, odds_value)
    }

    fn fabricated_alert(priority: AlertPriority, game: &str) -> Alert {
        let now = Utc::now();
        Alert {
            id: Uuid::new_v4(),
            kind: AlertKind::Value,
            priority,
            game_id: game.to_string(),
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
            message: "test alert".to_string(),
            created_at: now,
            expires_at: now + ChronoDuration::seconds(600),
            acknowledged: false,
        }
    }

    /// +105 / -90 across two books: ~2.3% margin, enough to alert
    fn arb_quotes() -> Vec<BookQuote> {
        vec![
            quote("fanduel", "Lakers", 105.0),
            quote("draftkings", "Celtics", -90.0),
        ]
    }

    struct RecordingSink {
        seen: Mutex<Vec<Alert>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, alert: &Alert, _report: Option<&VerificationReport>) -> Result<()> {
            self.seen.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn scripted_provider(quotes: Vec<BookQuote>) -> Arc<dyn OddsProvider> {
        let mut provider = MockOddsProvider::new();
        provider
            .expect_quotes()
            .returning(move |_, _| Ok(quotes.clone()));
        Arc::new(provider)
    }

    fn monitor_over(provider: Arc<dyn OddsProvider>, sinks: Vec<Arc<dyn AlertSink>>) -> Monitor {
        let config = AppConfig::default();
        let detector = Arc::new(ArbitrageDetector::new(
            ExecutionModel::new(&config.execution),
            Arc::new(NullOpportunityLog),
            &config.detector,
        ));
        let scanner = Arc::new(
            DiscrepancyScanner::new(provider.clone(), detector, &config)
                .expect("scanner config"),
        );
        let verifier = Arc::new(FinalVerifier::new(provider, config.verification.clone()));
        Monitor::new(scanner, verifier, sinks, Arc::new(Metrics::new()), &config)
    }

    #[tokio::test]
    async fn test_initial_state() {
        let monitor = monitor_over(scripted_provider(Vec::new()), vec![]);
        assert!(!monitor.is_running());

        let stats = monitor.stats().await;
        assert_eq!(stats.scan_count, 0);
        assert_eq!(stats.alerts_generated, 0);
        assert_eq!(stats.active_alert_count, 0);
        assert_eq!(stats.uptime_secs, 0);
        assert!(monitor.active_alerts(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_start_stop_flag() {
        let monitor = monitor_over(scripted_provider(Vec::new()), vec![]);
        monitor.start(vec![]).await;
        assert!(monitor.is_running());
        // second start is a no-op
        monitor.start(vec![]).await;
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_scan_cycle_enqueues_alert() {
        let monitor = monitor_over(scripted_provider(arb_quotes()), vec![]);
        let (tx, mut rx) = mpsc::channel::<Alert>(8);
        let game_ids = vec!["game-1".to_string()];

        Monitor::scan_cycle(
            &monitor.scanner,
            &monitor.factory,
            &monitor.verifier,
            &monitor.metrics,
            &game_ids,
            &tx,
            &monitor.state,
            monitor.cooldown,
        )
        .await;

        let alert = rx.try_recv().expect("alert enqueued");
        assert_eq!(alert.game_id, "game-1");
        assert_eq!(alert.kind, AlertKind::Arbitrage);

        let stats = monitor.stats().await;
        assert_eq!(stats.scan_count, 1);
        assert_eq!(stats.alerts_generated, 1);
        assert_eq!(stats.alerts_suppressed, 0);

        assert_eq!(monitor.metrics.scans.load(Ordering::Relaxed), 1);
        assert_eq!(monitor.metrics.quotes_fetched.load(Ordering::Relaxed), 2);
        assert_eq!(monitor.metrics.alerts_generated.load(Ordering::Relaxed), 1);
        assert_eq!(monitor.metrics.queue_depth.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_key() {
        let monitor = monitor_over(scripted_provider(arb_quotes()), vec![]);
        let (tx, mut rx) = mpsc::channel::<Alert>(8);
        let game_ids = vec!["game-1".to_string()];

        for _ in 0..2 {
            Monitor::scan_cycle(
                &monitor.scanner,
                &monitor.factory,
                &monitor.verifier,
                &monitor.metrics,
                &game_ids,
                &tx,
                &monitor.state,
                monitor.cooldown,
            )
            .await;
        }

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "second scan must not requeue the key");

        let stats = monitor.stats().await;
        assert_eq!(stats.scan_count, 2);
        assert_eq!(stats.alerts_generated, 2);
        assert_eq!(stats.alerts_suppressed, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let monitor = monitor_over(scripted_provider(arb_quotes()), vec![]);
        // capacity 1, pre-filled: the scan's alert has nowhere to go
        let (tx, _rx) = mpsc::channel::<Alert>(1);
        tx.try_send(fabricated_alert(AlertPriority::Low, "game-0"))
            .unwrap();

        Monitor::scan_cycle(
            &monitor.scanner,
            &monitor.factory,
            &monitor.verifier,
            &monitor.metrics,
            &["game-1".to_string()],
            &tx,
            &monitor.state,
            monitor.cooldown,
        )
        .await;

        let stats = monitor.stats().await;
        assert_eq!(stats.queue_dropped, 1);
    }

    #[tokio::test]
    async fn test_worker_verifies_and_dispatches() {
        let recorder = RecordingSink::new();
        let monitor = monitor_over(scripted_provider(arb_quotes()), vec![recorder.clone()]);
        monitor.running.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<Alert>(8);
        let outcome = monitor.scanner.scan_game("game-1").await.unwrap();
        let alert = monitor.factory.build(&outcome.discrepancies[0]).unwrap();
        let alert_id = alert.id;
        tx.send(alert).await.unwrap();
        drop(tx);

        Monitor::alert_worker(
            rx,
            &monitor.verifier,
            &monitor.sinks,
            &monitor.metrics,
            &monitor.state,
            &monitor.running,
        )
        .await;

        let delivered = recorder.seen.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].id, alert_id);
        drop(delivered);

        let stats = monitor.stats().await;
        assert_eq!(stats.alerts_verified, 1);
        assert_eq!(stats.alerts_cancelled_by_verification, 0);
        assert_eq!(stats.active_alert_count, 1);
        assert_eq!(monitor.metrics.alerts_dispatched.load(Ordering::Relaxed), 1);
        assert_eq!(monitor.metrics.sink_errors.load(Ordering::Relaxed), 0);

        let active = monitor.active_alerts(None).await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].status, AlertStatus::Dispatched);
        let report = active[0].verification.as_ref().expect("report attached");
        assert_eq!(report.outcome, VerificationOutcome::Valid);
    }

    #[tokio::test]
    async fn test_worker_cancels_on_shifted_odds() {
        // Scan sees the arbitrage, but verification sees moved prices
        let scan_provider = scripted_provider(arb_quotes());
        let verify_provider = scripted_provider(vec![
            quote("fanduel", "Lakers", 80.0),
            quote("draftkings", "Celtics", -115.0),
        ]);

        let recorder = RecordingSink::new();
        let config = AppConfig::default();
        let detector = Arc::new(ArbitrageDetector::new(
            ExecutionModel::new(&config.execution),
            Arc::new(NullOpportunityLog),
            &config.detector,
        ));
        let scanner = Arc::new(
            DiscrepancyScanner::new(scan_provider, detector, &config).expect("scanner config"),
        );
        let verifier = Arc::new(FinalVerifier::new(
            verify_provider,
            config.verification.clone(),
        ));
        let monitor = Monitor::new(
            scanner,
            verifier,
            vec![recorder.clone() as Arc<dyn AlertSink>],
            Arc::new(Metrics::new()),
            &config,
        );
        monitor.running.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<Alert>(8);
        let outcome = monitor.scanner.scan_game("game-1").await.unwrap();
        let alert = monitor.factory.build(&outcome.discrepancies[0]).unwrap();
        tx.send(alert).await.unwrap();
        drop(tx);

        Monitor::alert_worker(
            rx,
            &monitor.verifier,
            &monitor.sinks,
            &monitor.metrics,
            &monitor.state,
            &monitor.running,
        )
        .await;

        assert!(recorder.seen.lock().unwrap().is_empty());
        let stats = monitor.stats().await;
        assert_eq!(stats.alerts_verified, 0);
        assert_eq!(stats.alerts_cancelled_by_verification, 1);
        assert_eq!(stats.active_alert_count, 0);
    }

    #[tokio::test]
    async fn test_acknowledge_dispatched_alert() {
        let recorder = RecordingSink::new();
        let monitor = monitor_over(scripted_provider(arb_quotes()), vec![recorder]);
        monitor.running.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<Alert>(8);
        let outcome = monitor.scanner.scan_game("game-1").await.unwrap();
        let alert = monitor.factory.build(&outcome.discrepancies[0]).unwrap();
        let alert_id = alert.id;
        tx.send(alert).await.unwrap();
        drop(tx);

        Monitor::alert_worker(
            rx,
            &monitor.verifier,
            &monitor.sinks,
            &monitor.metrics,
            &monitor.state,
            &monitor.running,
        )
        .await;

        assert!(monitor.acknowledge(alert_id).await);
        assert!(!monitor.acknowledge(Uuid::new_v4()).await);

        let active = monitor.active_alerts(None).await;
        assert!(active[0].alert.acknowledged);
    }

    #[tokio::test]
    async fn test_priority_filter() {
        let monitor = monitor_over(scripted_provider(Vec::new()), vec![]);

        let low = fabricated_alert(AlertPriority::Low, "game-a");
        let critical = fabricated_alert(AlertPriority::Critical, "game-b");
        monitor.state.register_active(low.key(), &low).await;
        monitor.state.register_active(critical.key(), &critical).await;

        let all = monitor.active_alerts(None).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].alert.priority, AlertPriority::Critical);

        let high_up = monitor.active_alerts(Some(AlertPriority::High)).await;
        assert_eq!(high_up.len(), 1);
        assert_eq!(high_up[0].alert.priority, AlertPriority::Critical);
    }

    #[tokio::test]
    async fn test_prune_drops_expired_entries() {
        let monitor = monitor_over(scripted_provider(Vec::new()), vec![]);
        let now = Utc::now();

        let mut expired = fabricated_alert(AlertPriority::Medium, "game-1");
        expired.expires_at = now - ChronoDuration::seconds(1);
        monitor.state.register_active(expired.key(), &expired).await;
        monitor
            .state
            .stamp_cooldown(expired.key(), now - ChronoDuration::seconds(600))
            .await;

        monitor.state.prune(now, monitor.cooldown).await;

        assert!(monitor.state.active.read().await.is_empty());
        assert!(monitor.state.cooldowns.read().await.is_empty());
    }
}
