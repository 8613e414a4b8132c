// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Database monitor
//!
//! Owns the query tracker and index analyzer, runs a periodic analysis
//! pass, and drives DB-level maintenance through the [`DatabaseAdmin`]
//! seam. Each maintenance action is wrapped individually so one failure
//! never aborts the rest.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::index_analysis::{IndexAnalysisReport, IndexAnalyzer};
use super::stats::{QueryStats, QueryTracker, SlowQueryRecord};
use crate::perf::OptimizationResult;

/// Errors surfaced by the host's database administration hooks
#[derive(Error, Debug)]
pub enum DbAdminError {
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },
}

/// Administration seam to the external relational store
///
/// The monitor never talks to the database directly; the host wires in an
/// implementation bound to its actual store.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Refresh planner statistics
    async fn refresh_statistics(&self) -> Result<(), DbAdminError>;

    /// Rebuild the indexes of one table
    async fn rebuild_indexes(&self, table: &str) -> Result<(), DbAdminError>;

    /// Checkpoint the write-ahead log
    async fn checkpoint_wal(&self) -> Result<(), DbAdminError>;

    /// Reclaim free space, returning bytes reclaimed
    async fn reclaim_space(&self) -> Result<u64, DbAdminError>;

    async fn database_size_bytes(&self) -> Result<u64, DbAdminError>;

    async fn table_row_counts(&self) -> Result<HashMap<String, u64>, DbAdminError>;
}

/// Database monitor tuning knobs
#[derive(Debug, Clone)]
pub struct DbMonitorConfig {
    /// Executions at or above this duration enter the slow-query ring
    pub slow_query_threshold: Duration,
    /// Bound on the slow-query ring
    pub slow_log_capacity: usize,
    /// Interval between analysis passes
    pub analysis_interval: Duration,
    /// Tables at or above this row count are treated as fragmented
    pub fragmentation_row_threshold: u64,
}

impl Default for DbMonitorConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold: Duration::from_millis(100),
            slow_log_capacity: 500,
            analysis_interval: Duration::from_secs(300),
            fragmentation_row_threshold: 1_000_000,
        }
    }
}

/// Snapshot of database health for reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMonitorSnapshot {
    pub generated_at: DateTime<Utc>,
    pub total_executions: u64,
    pub distinct_templates: usize,
    pub slow_query_count: usize,
    pub top_queries: Vec<QueryStats>,
    pub recent_slow: Vec<SlowQueryRecord>,
    pub index_report: IndexAnalysisReport,
    pub database_size_bytes: Option<u64>,
    pub fragmented_tables: Vec<String>,
}

/// Query statistics, slow-query log and DB remediation
pub struct DatabaseMonitor {
    config: DbMonitorConfig,
    tracker: QueryTracker,
    indexes: IndexAnalyzer,
    admin: Arc<dyn DatabaseAdmin>,
    last_snapshot: RwLock<Option<DbMonitorSnapshot>>,
}

impl DatabaseMonitor {
    pub fn new(config: DbMonitorConfig, admin: Arc<dyn DatabaseAdmin>) -> Self {
        Self {
            tracker: QueryTracker::new(config.slow_query_threshold, config.slow_log_capacity),
            indexes: IndexAnalyzer::new(),
            config,
            admin,
            last_snapshot: RwLock::new(None),
        }
    }

    // === Recording surface used by the host's query layer ===

    pub fn record_query(&self, query: &str, duration: Duration, parameters: Option<Value>) {
        self.tracker.record(query, duration, parameters);
    }

    pub fn register_index_ddl(&self, ddl: &str) -> Option<String> {
        self.indexes.register_ddl(ddl)
    }

    pub fn record_index_use(&self, name: &str) {
        self.indexes.record_use(name);
    }

    // === Analysis ===

    /// Spawn the periodic analysis task
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.analysis_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_analysis().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("database monitor stopped");
        })
    }

    /// One analysis pass; probe failures degrade the snapshot, they do
    /// not fail the pass.
    pub async fn run_analysis(&self) -> DbMonitorSnapshot {
        let database_size_bytes = match self.admin.database_size_bytes().await {
            Ok(size) => Some(size),
            Err(e) => {
                log::warn!("database size probe failed: {}", e);
                None
            }
        };

        let fragmented_tables = match self.admin.table_row_counts().await {
            Ok(counts) => {
                let mut tables: Vec<String> = counts
                    .into_iter()
                    .filter(|(_, rows)| *rows >= self.config.fragmentation_row_threshold)
                    .map(|(table, _)| table)
                    .collect();
                tables.sort();
                tables
            }
            Err(e) => {
                log::warn!("table row count probe failed: {}", e);
                Vec::new()
            }
        };

        let snapshot = DbMonitorSnapshot {
            generated_at: Utc::now(),
            total_executions: self.tracker.total_executions(),
            distinct_templates: self.tracker.distinct_templates(),
            slow_query_count: self.tracker.slow_query_count(),
            top_queries: self.tracker.top_by_avg_time(10),
            recent_slow: self.tracker.recent_slow(10),
            index_report: self.indexes.analyze(),
            database_size_bytes,
            fragmented_tables,
        };

        *self.last_snapshot.write() = Some(snapshot.clone());
        snapshot
    }

    /// Latest analysis snapshot, if a pass has run
    pub fn last_snapshot(&self) -> Option<DbMonitorSnapshot> {
        self.last_snapshot.read().clone()
    }

    /// Slow executions recorded in the last `window`
    pub fn slow_count_within(&self, window: Duration) -> usize {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::minutes(5));
        self.tracker.slow_count_since(cutoff)
    }

    // === Maintenance ===

    /// Run the full maintenance set; each action is isolated and always
    /// produces a result entry.
    pub async fn run_maintenance(&self) -> Vec<OptimizationResult> {
        let fragmented = self
            .last_snapshot()
            .map(|s| s.fragmented_tables)
            .unwrap_or_default();

        let mut results = Vec::with_capacity(4);

        results.push(
            self.run_action("db_statistics_refresh", || async {
                self.admin.refresh_statistics().await?;
                Ok(HashMap::new())
            })
            .await,
        );

        results.push(
            self.run_action("db_reindex_fragmented", || async {
                let mut improvements = HashMap::new();
                for table in &fragmented {
                    self.admin.rebuild_indexes(table).await?;
                }
                improvements.insert("tables_reindexed".to_string(), fragmented.len() as f64);
                Ok(improvements)
            })
            .await,
        );

        results.push(
            self.run_action("db_wal_checkpoint", || async {
                self.admin.checkpoint_wal().await?;
                Ok(HashMap::new())
            })
            .await,
        );

        results.push(
            self.run_action("db_space_reclaim", || async {
                let reclaimed = self.admin.reclaim_space().await?;
                let mut improvements = HashMap::new();
                improvements.insert("bytes_reclaimed".to_string(), reclaimed as f64);
                Ok(improvements)
            })
            .await,
        );

        results
    }

    async fn run_action<F, Fut>(&self, name: &str, action: F) -> OptimizationResult
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<HashMap<String, f64>, DbAdminError>>,
    {
        let started = Instant::now();
        let (success, improvements, errors) = match action().await {
            Ok(improvements) => (true, improvements, Vec::new()),
            Err(e) => {
                log::warn!("maintenance action {} failed: {}", name, e);
                (false, HashMap::new(), vec![e.to_string()])
            }
        };
        OptimizationResult {
            optimization_type: name.to_string(),
            success,
            improvements,
            errors,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        }
    }
}
