// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Adaptive performance optimizer
//!
//! Samples process and host metrics on a fixed interval, classifies each
//! sample against the static threshold table, watches per-metric trends,
//! and dispatches remediations for the issue classes it knows how to fix.
//! A failed cycle is logged and the task continues on its next tick;
//! remediation runs on its own task and never blocks sampling.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Disks, System};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::MonitorError;
use super::issues::{IssueRegistry, IssueType, OptimizationHistory, OptimizationResult, PerformanceIssue, Severity};
use super::metrics::{
    HealthLevel, PerformanceMetric, METRIC_CACHE_MISS_RATE, METRIC_CPU, METRIC_DISK,
    METRIC_LOAD_AVG, METRIC_MEMORY, METRIC_PROCESS_RSS, METRIC_TASKS,
};
use super::trend::TrendTracker;
use crate::cache::CacheStore;

/// Optimizer tuning knobs
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Interval between sampling cycles
    pub sample_interval: Duration,
    /// Trend window per metric
    pub trend_window: Duration,
    /// Minimum positive slope (units/second) that counts as a trend
    pub trend_epsilon: f64,
    /// Dispatch remediations automatically when an issue supports one
    pub auto_remediate: bool,
    /// Open issues escalate one severity step after this long unresolved
    pub issue_escalation_timeout: Duration,
    /// Bound on the remediation history
    pub history_capacity: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(30),
            trend_window: Duration::from_secs(600),
            trend_epsilon: 0.01,
            auto_remediate: true,
            issue_escalation_timeout: Duration::from_secs(30 * 60),
            history_capacity: 200,
        }
    }
}

/// Periodic sampler, issue detector and auto-remediation executor
pub struct PerformanceOptimizer {
    config: OptimizerConfig,
    system: Mutex<System>,
    latest: RwLock<HashMap<String, PerformanceMetric>>,
    trends: Mutex<HashMap<String, TrendTracker>>,
    issues: IssueRegistry,
    history: OptimizationHistory,
    store: Arc<CacheStore>,
    monitored_tasks: AtomicUsize,
}

impl PerformanceOptimizer {
    pub fn new(config: OptimizerConfig, store: Arc<CacheStore>) -> Self {
        Self {
            history: OptimizationHistory::new(config.history_capacity),
            config,
            system: Mutex::new(System::new_all()),
            latest: RwLock::new(HashMap::new()),
            trends: Mutex::new(HashMap::new()),
            issues: IssueRegistry::new(),
            store,
            monitored_tasks: AtomicUsize::new(0),
        }
    }

    /// Spawn the sampling loop; exits when the shutdown signal flips
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sample_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.monitor_cycle().await {
                            log::error!("optimizer cycle failed, retrying next tick: {}", e);
                        }
                        if self.config.auto_remediate {
                            for issue_type in self.auto_fixable_open_issues() {
                                let optimizer = self.clone();
                                tokio::spawn(async move {
                                    let result = optimizer.run_remediation(issue_type).await;
                                    optimizer.history.push(result);
                                });
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("performance optimizer stopped");
        })
    }

    /// One sampling cycle: sample, classify, trend-check
    pub async fn monitor_cycle(&self) -> Result<(), MonitorError> {
        let samples = self.sample_once()?;
        for metric in samples {
            self.ingest_metric(metric);
        }
        self.resolve_recovered();
        self.issues.escalate_stale(
            Utc::now(),
            chrono::Duration::from_std(self.config.issue_escalation_timeout)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
        );
        Ok(())
    }

    /// Run one metric through trend tracking, threshold classification
    /// and the issue registry. Sampled and externally reported metrics
    /// take the same path.
    fn ingest_metric(&self, metric: PerformanceMetric) {
        self.ingest_metric_at(metric, Utc::now());
    }

    fn ingest_metric_at(&self, metric: PerformanceMetric, now: chrono::DateTime<Utc>) {
        let level = metric.level();

        {
            let mut trends = self.trends.lock();
            let tracker = trends
                .entry(metric.name.clone())
                .or_insert_with(|| TrendTracker::new(self.config.trend_window));
            tracker.record(now, metric.value);

            if level.is_poor_or_worse() {
                if let Some(slope) = tracker.slope() {
                    if slope > self.config.trend_epsilon {
                        self.issues.open_issue(
                            IssueType::SustainedDegradation,
                            &metric.name,
                            Severity::High,
                            format!(
                                "{} is degrading steadily ({:+.3}/s over the window)",
                                metric.name, slope
                            ),
                            vec![metric.clone()],
                            vec![format!(
                                "Investigate what started driving {} upward",
                                metric.name
                            )],
                        );
                    }
                }
            }
        }

        self.classify(&metric, level);
        self.latest.write().insert(metric.name.clone(), metric);
    }

    /// Sample process/host metrics; any probe failure fails the cycle
    fn sample_once(&self) -> Result<Vec<PerformanceMetric>, MonitorError> {
        let mut system = self.system.lock();
        system.refresh_cpu();
        system.refresh_memory();

        let mut samples = Vec::with_capacity(7);

        let cpu = system.global_cpu_info().cpu_usage() as f64;
        samples.push(PerformanceMetric::new(METRIC_CPU, cpu, "%"));

        let total_memory = system.total_memory();
        if total_memory == 0 {
            return Err(MonitorError::Sampling(
                "total memory reported as zero".to_string(),
            ));
        }
        let memory_pct = system.used_memory() as f64 / total_memory as f64 * 100.0;
        samples.push(PerformanceMetric::new(METRIC_MEMORY, memory_pct, "%"));

        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(t, a), disk| {
                (t + disk.total_space(), a + disk.available_space())
            });
        if total > 0 {
            let disk_pct = (total - available) as f64 / total as f64 * 100.0;
            samples.push(PerformanceMetric::new(METRIC_DISK, disk_pct, "%"));
        }

        if let Ok(pid) = sysinfo::get_current_pid() {
            system.refresh_process(pid);
            if let Some(process) = system.process(pid) {
                let rss_mb = process.memory() as f64 / (1024.0 * 1024.0);
                samples.push(PerformanceMetric::new(METRIC_PROCESS_RSS, rss_mb, "MB"));
            }
        }

        let load = System::load_average();
        samples.push(PerformanceMetric::new(METRIC_LOAD_AVG, load.one, ""));

        samples.push(PerformanceMetric::new(
            METRIC_TASKS,
            self.monitored_tasks.load(Ordering::Relaxed) as f64,
            "tasks",
        ));

        // Cache health folded into the same metric stream so trend and
        // issue handling treat it like any other resource
        let cache_stats = self.store.metrics_snapshot();
        let (hits, requests) = cache_stats.values().fold((0u64, 0u64), |(h, r), s| {
            (h + s.hits, r + s.hits + s.misses)
        });
        if requests >= 100 {
            let miss_rate = (1.0 - hits as f64 / requests as f64) * 100.0;
            samples.push(PerformanceMetric::new(
                METRIC_CACHE_MISS_RATE,
                miss_rate,
                "%",
            ));
        }

        Ok(samples)
    }

    /// Threshold classification; history never influences this step
    fn classify(&self, metric: &PerformanceMetric, level: HealthLevel) {
        if !level.is_poor_or_worse() {
            return;
        }
        let Some((issue_type, suggestions)) = issue_for_metric(&metric.name) else {
            return;
        };
        let severity = if level == HealthLevel::Critical {
            Severity::Critical
        } else {
            Severity::Medium
        };
        self.issues.open_issue(
            issue_type,
            &metric.name,
            severity,
            format!(
                "{} at {:.1}{} breached its {} threshold",
                metric.name,
                metric.value,
                metric.unit,
                if level == HealthLevel::Critical {
                    "critical"
                } else {
                    "warning"
                }
            ),
            vec![metric.clone()],
            suggestions,
        );
    }

    /// Close issues whose underlying metric has recovered
    fn resolve_recovered(&self) {
        let latest = self.latest.read();
        for issue in self.issues.open_issues() {
            let Some(metric_name) = issue.id.split(':').nth(1) else {
                continue;
            };
            if let Some(metric) = latest.get(metric_name) {
                if metric.level() == HealthLevel::Good {
                    self.issues.resolve(issue.issue_type, metric_name);
                }
            }
        }
    }

    /// Auto-fixable issue classes currently open, one entry per class
    fn auto_fixable_open_issues(&self) -> Vec<IssueType> {
        let mut seen = std::collections::HashSet::new();
        self.issues
            .open_issues()
            .into_iter()
            .filter(|issue| issue.auto_fix_available)
            .filter_map(|issue| seen.insert(issue.issue_type).then_some(issue.issue_type))
            .collect()
    }

    /// Execute one remediation; the outcome is always recorded
    async fn run_remediation(&self, issue_type: IssueType) -> OptimizationResult {
        let started = Instant::now();
        let mut improvements = HashMap::new();
        let mut errors = Vec::new();

        match issue_type {
            IssueType::MemoryPressure | IssueType::CacheDegradation => {
                let (local, shared) = self.store.sweep_expired().await;
                improvements.insert("local_entries_swept".to_string(), local as f64);
                improvements.insert("shared_entries_swept".to_string(), shared as f64);
            }
            other => {
                errors.push(
                    MonitorError::Remediation {
                        action: other.as_str().to_string(),
                        reason: "no automatic remediation registered".to_string(),
                    }
                    .to_string(),
                );
            }
        }

        let success = errors.is_empty();
        if success {
            log::info!(
                "remediation {} completed in {:?}",
                issue_type.as_str(),
                started.elapsed()
            );
        } else {
            log::warn!("remediation {} failed: {:?}", issue_type.as_str(), errors);
        }
        OptimizationResult {
            optimization_type: issue_type.as_str().to_string(),
            success,
            improvements,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        }
    }

    /// Run a remediation on demand, outside the automatic cycle
    pub async fn force_optimization(&self, kind: &str) -> Result<OptimizationResult, MonitorError> {
        let issue_type = match kind {
            "memory" | "memory_pressure" => IssueType::MemoryPressure,
            "cache" | "cache_degradation" => IssueType::CacheDegradation,
            other => return Err(MonitorError::UnknownOptimization(other.to_string())),
        };
        let result = self.run_remediation(issue_type).await;
        self.history.push(result.clone());
        Ok(result)
    }

    /// Append an externally produced result to the remediation history
    pub fn record_result(&self, result: OptimizationResult) {
        self.history.push(result);
    }

    /// Record a metric produced outside the sampler (e.g. API latency);
    /// it is classified and trend-tracked like any sampled metric.
    pub fn record_metric(&self, name: &str, value: f64, unit: &str) {
        self.ingest_metric(PerformanceMetric::new(name, value, unit));
    }

    /// Gauge maintained by the manager: number of live background tasks
    pub fn set_monitored_tasks(&self, count: usize) {
        self.monitored_tasks.store(count, Ordering::Relaxed);
    }

    pub fn latest_metrics(&self) -> Vec<PerformanceMetric> {
        self.latest.read().values().cloned().collect()
    }

    pub fn metric(&self, name: &str) -> Option<PerformanceMetric> {
        self.latest.read().get(name).cloned()
    }

    pub fn open_issues(&self) -> Vec<PerformanceIssue> {
        self.issues.open_issues()
    }

    pub fn optimization_history(&self, limit: usize) -> Vec<OptimizationResult> {
        self.history.recent(limit)
    }

    /// Worst classification among the latest samples
    pub fn health_level(&self) -> HealthLevel {
        self.latest
            .read()
            .values()
            .map(|m| m.level())
            .max()
            .unwrap_or(HealthLevel::Good)
    }

    pub fn issues(&self) -> &IssueRegistry {
        &self.issues
    }
}

/// Issue class and stock suggestions for a sampled metric
fn issue_for_metric(name: &str) -> Option<(IssueType, Vec<String>)> {
    match name {
        METRIC_CPU | METRIC_LOAD_AVG => Some((
            IssueType::CpuSaturation,
            vec![
                "Profile hot request paths".to_string(),
                "Move CPU-heavy work onto the blocking pool".to_string(),
            ],
        )),
        METRIC_MEMORY | METRIC_PROCESS_RSS => Some((
            IssueType::MemoryPressure,
            vec![
                "Sweep expired cache entries".to_string(),
                "Lower local-tier entry bounds".to_string(),
            ],
        )),
        METRIC_DISK => Some((
            IssueType::DiskPressure,
            vec!["Reclaim space from the durable tier and logs".to_string()],
        )),
        METRIC_CACHE_MISS_RATE => Some((
            IssueType::CacheDegradation,
            vec![
                "Sweep expired entries".to_string(),
                "Review TTLs for the hot data types".to_string(),
            ],
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheRegistry, SledTier, StoreConfig};
    use crate::perf::metrics::METRIC_API_LATENCY;
    use chrono::Duration as ChronoDuration;

    fn optimizer() -> PerformanceOptimizer {
        let shared = Arc::new(SledTier::open_temporary().unwrap());
        let store = Arc::new(
            CacheStore::new(&StoreConfig::default(), CacheRegistry::new(), shared).unwrap(),
        );
        PerformanceOptimizer::new(OptimizerConfig::default(), store)
    }

    #[tokio::test]
    async fn rising_series_on_a_poor_metric_opens_a_sustained_issue() {
        let optimizer = optimizer();
        let start = Utc::now();

        // API latency above its warning threshold and climbing
        for (i, value) in [550.0, 560.0, 570.0, 580.0, 590.0].iter().enumerate() {
            optimizer.ingest_metric_at(
                PerformanceMetric::new(METRIC_API_LATENCY, *value, "ms"),
                start + ChronoDuration::seconds(30 * i as i64),
            );
        }

        let issues = optimizer.open_issues();
        assert!(issues
            .iter()
            .any(|i| i.issue_type == IssueType::SustainedDegradation));
    }

    #[tokio::test]
    async fn flat_series_opens_no_trend_issue_even_when_poor() {
        let optimizer = optimizer();
        let start = Utc::now();

        for i in 0..5 {
            optimizer.ingest_metric_at(
                PerformanceMetric::new(METRIC_API_LATENCY, 550.0, "ms"),
                start + ChronoDuration::seconds(30 * i),
            );
        }

        assert!(optimizer.open_issues().is_empty());
    }

    #[tokio::test]
    async fn healthy_metrics_open_no_issues_regardless_of_slope() {
        let optimizer = optimizer();
        let start = Utc::now();

        for (i, value) in [50.0, 55.0, 60.0, 65.0, 70.0].iter().enumerate() {
            optimizer.ingest_metric_at(
                PerformanceMetric::new(METRIC_API_LATENCY, *value, "ms"),
                start + ChronoDuration::seconds(30 * i as i64),
            );
        }

        assert!(optimizer.open_issues().is_empty());
    }
}
