// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Unified performance manager
//!
//! Orchestrates the optimizer, the database monitor and the cache
//! facade's health checks; correlates signals across them; owns the
//! alert lifecycle; and assembles periodic reports. Start is idempotent
//! and stop cancels every background task through one shutdown signal.

pub mod alerts;
pub mod health;
pub mod report;

pub use alerts::{AlertCenter, AlertConfig, PerformanceAlert};
pub use health::{ComponentScore, DbHealthInputs, SystemHealthReport};
pub use report::{PerformanceReport, SystemStatus};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::CacheFacade;
use crate::dbmon::DatabaseMonitor;
use crate::perf::metrics::METRIC_API_LATENCY;
use crate::perf::{MonitorError, OptimizationResult, PerformanceOptimizer, Severity};

const ALERT_DB_APP: &str = "database_application_pressure";
const ALERT_CACHE_APP: &str = "cache_application_pressure";

/// Manager tuning knobs
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub correlation_interval: Duration,
    pub alert_interval: Duration,
    pub report_interval: Duration,
    pub cleanup_interval: Duration,
    pub alerts: AlertConfig,
    /// Window for the slow-query correlation rule
    pub slow_query_window: Duration,
    /// Slow-query count that trips the correlation rule
    pub slow_query_alert_threshold: usize,
    /// Database size considered adverse for the health score
    pub db_size_alert_bytes: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            correlation_interval: Duration::from_secs(60),
            alert_interval: Duration::from_secs(60),
            report_interval: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(300),
            alerts: AlertConfig::default(),
            slow_query_window: Duration::from_secs(300),
            slow_query_alert_threshold: 10,
            db_size_alert_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

/// Shared view handed to every background task
#[derive(Clone)]
struct MonitorContext {
    config: ManagerConfig,
    cache: Arc<CacheFacade>,
    optimizer: Arc<PerformanceOptimizer>,
    db_monitor: Arc<DatabaseMonitor>,
    alerts: Arc<AlertCenter>,
    last_report: Arc<RwLock<Option<PerformanceReport>>>,
}

impl MonitorContext {
    /// Evaluate the cross-component correlation rules once
    async fn correlation_cycle(&self) {
        let app_level = self.optimizer.health_level();

        // Slow database + degraded application => database is dragging
        // the application down
        let slow_recent = self
            .db_monitor
            .slow_count_within(self.config.slow_query_window);
        let db_rule_holds =
            slow_recent >= self.config.slow_query_alert_threshold && app_level.is_poor_or_worse();
        if db_rule_holds {
            self.alerts.raise(
                ALERT_DB_APP,
                Severity::High,
                "database",
                format!(
                    "{} slow queries in the last {:?} while application health is {:?}",
                    slow_recent, self.config.slow_query_window, app_level
                ),
                json!({ "slow_queries": slow_recent, "app_level": app_level }),
            );
        } else if self.alerts.is_active(ALERT_DB_APP) {
            self.alerts.resolve(ALERT_DB_APP, true);
        }

        // Unhealthy cache + poor API latency => cache misses are hitting
        // the request path
        let cache_health = self.cache.health().await;
        let latency_poor = self
            .optimizer
            .metric(METRIC_API_LATENCY)
            .map(|m| m.level().is_poor_or_worse())
            .unwrap_or(false);
        let cache_rule_holds =
            cache_health.status != crate::cache::HealthStatus::Healthy && latency_poor;
        if cache_rule_holds {
            self.alerts.raise(
                ALERT_CACHE_APP,
                Severity::High,
                "cache",
                "cache is unhealthy while API latency is degraded".to_string(),
                json!({ "cache_status": cache_health.status }),
            );
        } else if self.alerts.is_active(ALERT_CACHE_APP) {
            self.alerts.resolve(ALERT_CACHE_APP, true);
        }
    }

    async fn cleanup_cycle(&self) {
        let (local, shared) = self.cache.store().sweep_expired().await;
        if local + shared > 0 {
            log::debug!(
                "cleanup swept {} local / {} shared expired entries",
                local,
                shared
            );
        }
        let pruned = self.cache.sessions().prune_rate_windows(Utc::now());
        if pruned > 0 {
            log::debug!("cleanup dropped {} idle rate-limit windows", pruned);
        }
        self.optimizer.issues().prune_resolved();
    }

    /// Composite health over application, cache and database
    async fn system_health(&self) -> SystemHealthReport {
        let issues = self.optimizer.open_issues();
        let cache_stats = self.cache.stats();
        let shared_ok = self.cache.store().shared_tier_healthy().await;
        let snapshot = self.db_monitor.last_snapshot();
        let db_inputs = DbHealthInputs::from_snapshot(
            snapshot.as_ref(),
            self.db_monitor
                .slow_count_within(self.config.slow_query_window),
            self.config.slow_query_alert_threshold,
            self.config.db_size_alert_bytes,
        );
        health::compute_health(&issues, &cache_stats, shared_ok, &db_inputs)
    }

    async fn build_report(&self) -> PerformanceReport {
        let health = self.system_health().await;
        let cache_health = self.cache.health().await;
        let database = self.db_monitor.last_snapshot();

        let mut recommendations = cache_health.recommendations.clone();
        if let Some(snapshot) = &database {
            recommendations.extend(snapshot.index_report.recommendations.clone());
        }
        for issue in self.optimizer.open_issues() {
            recommendations.extend(issue.suggestions.clone());
        }
        recommendations.dedup();

        PerformanceReport {
            generated_at: Utc::now(),
            health,
            cache_health,
            cache_stats: self.cache.stats(),
            database,
            latest_metrics: self.optimizer.latest_metrics(),
            open_issues: self.optimizer.open_issues(),
            recommendations,
            recent_optimizations: self.optimizer.optimization_history(10),
            active_alerts: self.alerts.active_alerts(),
        }
    }

    async fn report_cycle(&self) {
        let report = self.build_report().await;
        log::info!(
            "performance report: score {:.1} ({:?}), {} open issues, {} active alerts",
            report.health.overall_score,
            report.health.level,
            report.open_issues.len(),
            report.active_alerts.len()
        );
        *self.last_report.write() = Some(report);
    }
}

/// Top-level orchestrator for the monitoring subsystem
pub struct UnifiedPerformanceManager {
    ctx: MonitorContext,
    running: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UnifiedPerformanceManager {
    pub fn new(
        config: ManagerConfig,
        cache: Arc<CacheFacade>,
        optimizer: Arc<PerformanceOptimizer>,
        db_monitor: Arc<DatabaseMonitor>,
    ) -> Self {
        Self {
            ctx: MonitorContext {
                alerts: Arc::new(AlertCenter::new(config.alerts.clone())),
                config,
                cache,
                optimizer,
                db_monitor,
                last_report: Arc::new(RwLock::new(None)),
            },
            running: AtomicBool::new(false),
            started_at: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start every background task; calling twice is a no-op
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            log::debug!("performance manager already running");
            return;
        }
        *self.started_at.lock() = Some(Instant::now());

        let (tx, rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(tx);

        let mut tasks = self.tasks.lock();
        tasks.push(self.ctx.optimizer.clone().spawn(rx.clone()));
        tasks.push(self.ctx.db_monitor.clone().spawn(rx.clone()));
        tasks.push(spawn_periodic(
            "correlation",
            self.ctx.config.correlation_interval,
            self.ctx.clone(),
            rx.clone(),
            |ctx| async move { ctx.correlation_cycle().await },
        ));
        tasks.push(spawn_periodic(
            "alert-lifecycle",
            self.ctx.config.alert_interval,
            self.ctx.clone(),
            rx.clone(),
            |ctx| async move { ctx.alerts.lifecycle_tick(Utc::now()) },
        ));
        tasks.push(spawn_periodic(
            "reporting",
            self.ctx.config.report_interval,
            self.ctx.clone(),
            rx.clone(),
            |ctx| async move { ctx.report_cycle().await },
        ));
        tasks.push(spawn_periodic(
            "cleanup",
            self.ctx.config.cleanup_interval,
            self.ctx.clone(),
            rx,
            |ctx| async move { ctx.cleanup_cycle().await },
        ));

        self.ctx.optimizer.set_monitored_tasks(tasks.len());
        log::info!(
            "performance manager started with {} background tasks",
            tasks.len()
        );
    }

    /// Signal shutdown and wait for every task to exit
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(true);
        }
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::warn!("background task ended abnormally: {}", e);
                }
            }
        }
        self.ctx.optimizer.set_monitored_tasks(0);
        log::info!("performance manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // === Correlation and health (also exercised directly by tests) ===

    pub async fn correlation_cycle(&self) {
        self.ctx.correlation_cycle().await;
    }

    pub async fn system_health(&self) -> SystemHealthReport {
        self.ctx.system_health().await
    }

    // === Operational surface ===

    /// Assemble a fresh report
    pub async fn get_performance_report(&self) -> PerformanceReport {
        let report = self.ctx.build_report().await;
        *self.ctx.last_report.write() = Some(report.clone());
        report
    }

    /// Most recent periodic report without recomputation
    pub fn last_report(&self) -> Option<PerformanceReport> {
        self.ctx.last_report.read().clone()
    }

    pub fn get_active_alerts(&self) -> Vec<PerformanceAlert> {
        self.ctx.alerts.active_alerts()
    }

    /// Run a remediation on demand; "database" runs the DB maintenance
    /// set, other kinds go to the optimizer's registry.
    pub async fn force_optimization(
        &self,
        kind: &str,
    ) -> Result<Vec<OptimizationResult>, MonitorError> {
        if kind == "database" {
            let results = self.ctx.db_monitor.run_maintenance().await;
            for result in &results {
                self.ctx.optimizer.record_result(result.clone());
            }
            return Ok(results);
        }
        let result = self.ctx.optimizer.force_optimization(kind).await?;
        Ok(vec![result])
    }

    pub fn get_optimization_history(&self, limit: usize) -> Vec<OptimizationResult> {
        self.ctx.optimizer.optimization_history(limit)
    }

    pub async fn get_system_status(&self) -> SystemStatus {
        let health = self.ctx.system_health().await;
        SystemStatus {
            running: self.is_running(),
            health_level: health.level,
            health_score: health.overall_score,
            open_issues: self.ctx.optimizer.open_issues().len(),
            active_alerts: self.ctx.alerts.active_count(),
            local_cache_entries: self.ctx.cache.store().local_entry_count(),
            uptime_seconds: self
                .started_at
                .lock()
                .map(|at| at.elapsed().as_secs())
                .unwrap_or(0),
            generated_at: Utc::now(),
        }
    }

    pub fn alerts(&self) -> &AlertCenter {
        &self.ctx.alerts
    }
}

/// Spawn a fixed-interval task that exits on the shutdown signal
fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    ctx: MonitorContext,
    mut shutdown: watch::Receiver<bool>,
    cycle: F,
) -> JoinHandle<()>
where
    F: Fn(MonitorContext) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cycle(ctx.clone()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        log::debug!("{} task stopped", name);
    })
}
