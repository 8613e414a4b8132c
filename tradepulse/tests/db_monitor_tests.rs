//! Tests for the database monitor: analysis passes, slow-query windows
//! and the isolation of maintenance actions

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tradepulse::dbmon::{
    DatabaseAdmin, DatabaseMonitor, DbAdminError, DbMonitorConfig,
};

/// In-memory stand-in for the relational store's admin surface
#[derive(Default)]
struct FakeAdmin {
    row_counts: HashMap<String, u64>,
    size_bytes: u64,
    fail_checkpoint: bool,
    actions: Mutex<Vec<String>>,
}

impl FakeAdmin {
    fn record(&self, action: &str) {
        self.actions.lock().push(action.to_string());
    }
}

#[async_trait]
impl DatabaseAdmin for FakeAdmin {
    async fn refresh_statistics(&self) -> Result<(), DbAdminError> {
        self.record("refresh_statistics");
        Ok(())
    }

    async fn rebuild_indexes(&self, table: &str) -> Result<(), DbAdminError> {
        self.record(&format!("rebuild:{}", table));
        Ok(())
    }

    async fn checkpoint_wal(&self) -> Result<(), DbAdminError> {
        self.record("checkpoint_wal");
        if self.fail_checkpoint {
            return Err(DbAdminError::ActionFailed {
                action: "checkpoint_wal".to_string(),
                reason: "wal locked".to_string(),
            });
        }
        Ok(())
    }

    async fn reclaim_space(&self) -> Result<u64, DbAdminError> {
        self.record("reclaim_space");
        Ok(4096)
    }

    async fn database_size_bytes(&self) -> Result<u64, DbAdminError> {
        Ok(self.size_bytes)
    }

    async fn table_row_counts(&self) -> Result<HashMap<String, u64>, DbAdminError> {
        Ok(self.row_counts.clone())
    }
}

fn monitor_with(admin: FakeAdmin) -> DatabaseMonitor {
    DatabaseMonitor::new(DbMonitorConfig::default(), Arc::new(admin))
}

#[tokio::test]
async fn analysis_snapshot_aggregates_queries_and_indexes() {
    let monitor = monitor_with(FakeAdmin {
        size_bytes: 1024,
        ..FakeAdmin::default()
    });

    monitor.record_query(
        "SELECT * FROM notes WHERE user_id = 1",
        Duration::from_millis(20),
        None,
    );
    monitor.record_query(
        "SELECT * FROM notes WHERE user_id = 2",
        Duration::from_millis(40),
        None,
    );
    monitor.record_query(
        "SELECT * FROM trades WHERE id = 5",
        Duration::from_millis(250),
        None,
    );
    monitor.register_index_ddl("CREATE INDEX idx_notes_user ON notes (user_id)");
    monitor.record_index_use("idx_notes_user");
    monitor.register_index_ddl("CREATE INDEX idx_trades_note ON trades (note)");

    let snapshot = monitor.run_analysis().await;
    assert_eq!(snapshot.total_executions, 3);
    assert_eq!(snapshot.distinct_templates, 2);
    assert_eq!(snapshot.slow_query_count, 1);
    assert_eq!(snapshot.database_size_bytes, Some(1024));
    assert_eq!(
        snapshot.index_report.unused,
        vec!["idx_trades_note".to_string()]
    );
    assert_eq!(monitor.last_snapshot().unwrap().total_executions, 3);
}

#[tokio::test]
async fn slow_queries_inside_the_window_are_counted() {
    let monitor = monitor_with(FakeAdmin::default());
    for i in 0..4 {
        monitor.record_query(
            &format!("SELECT pg_sleep({})", i),
            Duration::from_millis(150),
            None,
        );
    }
    monitor.record_query("SELECT 1", Duration::from_millis(1), None);

    assert_eq!(monitor.slow_count_within(Duration::from_secs(300)), 4);
}

#[tokio::test]
async fn large_tables_are_flagged_as_fragmented() {
    let mut row_counts = HashMap::new();
    row_counts.insert("events".to_string(), 5_000_000u64);
    row_counts.insert("users".to_string(), 1_000u64);

    let monitor = monitor_with(FakeAdmin {
        row_counts,
        ..FakeAdmin::default()
    });
    let snapshot = monitor.run_analysis().await;
    assert_eq!(snapshot.fragmented_tables, vec!["events".to_string()]);
}

#[tokio::test]
async fn one_failing_maintenance_action_does_not_abort_the_rest() {
    let mut row_counts = HashMap::new();
    row_counts.insert("events".to_string(), 5_000_000u64);

    let monitor = monitor_with(FakeAdmin {
        row_counts,
        fail_checkpoint: true,
        ..FakeAdmin::default()
    });
    // Analysis first so the reindex step knows its fragmented tables
    monitor.run_analysis().await;

    let results = monitor.run_maintenance().await;
    assert_eq!(results.len(), 4);

    let by_type: HashMap<&str, bool> = results
        .iter()
        .map(|r| (r.optimization_type.as_str(), r.success))
        .collect();
    assert_eq!(by_type["db_statistics_refresh"], true);
    assert_eq!(by_type["db_wal_checkpoint"], false);
    assert_eq!(by_type["db_space_reclaim"], true);
    assert_eq!(by_type["db_reindex_fragmented"], true);

    let reindex = results
        .iter()
        .find(|r| r.optimization_type == "db_reindex_fragmented")
        .unwrap();
    assert_eq!(reindex.improvements["tables_reindexed"], 1.0);

    let failed = results
        .iter()
        .find(|r| r.optimization_type == "db_wal_checkpoint")
        .unwrap();
    assert!(failed.errors[0].contains("wal locked"));
}
