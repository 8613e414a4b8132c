//! Tests for the optimizer and the unified manager: sampling, forced
//! remediation, correlation rules, alerts and reporting

use async_trait::async_trait;
use serial_test::serial;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tradepulse::dbmon::{DatabaseAdmin, DbAdminError};
use tradepulse::perf::metrics::{METRIC_API_LATENCY, METRIC_CPU};
use tradepulse::{
    CacheFacade, DatabaseMonitor, DbMonitorConfig, ManagerConfig, OptimizerConfig,
    PerformanceOptimizer, StoreConfig, UnifiedPerformanceManager,
};

struct NoopAdmin;

#[async_trait]
impl DatabaseAdmin for NoopAdmin {
    async fn refresh_statistics(&self) -> Result<(), DbAdminError> {
        Ok(())
    }
    async fn rebuild_indexes(&self, _table: &str) -> Result<(), DbAdminError> {
        Ok(())
    }
    async fn checkpoint_wal(&self) -> Result<(), DbAdminError> {
        Ok(())
    }
    async fn reclaim_space(&self) -> Result<u64, DbAdminError> {
        Ok(0)
    }
    async fn database_size_bytes(&self) -> Result<u64, DbAdminError> {
        Ok(0)
    }
    async fn table_row_counts(&self) -> Result<HashMap<String, u64>, DbAdminError> {
        Ok(HashMap::new())
    }
}

fn build_stack() -> (
    Arc<CacheFacade>,
    Arc<PerformanceOptimizer>,
    Arc<DatabaseMonitor>,
    Arc<UnifiedPerformanceManager>,
) {
    let _ = env_logger::builder().is_test(true).try_init();
    let cache = Arc::new(CacheFacade::init(StoreConfig::default()).unwrap());
    let optimizer = Arc::new(PerformanceOptimizer::new(
        OptimizerConfig::default(),
        cache.store().clone(),
    ));
    let db_monitor = Arc::new(DatabaseMonitor::new(
        DbMonitorConfig::default(),
        Arc::new(NoopAdmin),
    ));
    let manager = Arc::new(UnifiedPerformanceManager::new(
        ManagerConfig {
            slow_query_alert_threshold: 3,
            ..ManagerConfig::default()
        },
        cache.clone(),
        optimizer.clone(),
        db_monitor.clone(),
    ));
    (cache, optimizer, db_monitor, manager)
}

#[tokio::test]
#[serial]
async fn a_monitor_cycle_populates_the_metric_set() {
    let (_cache, optimizer, _db, _manager) = build_stack();

    optimizer.monitor_cycle().await.unwrap();
    let metrics = optimizer.latest_metrics();
    assert!(!metrics.is_empty());

    let names: Vec<&str> = metrics.iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"cpu_percent"));
    assert!(names.contains(&"memory_percent"));
}

#[tokio::test]
async fn forced_cache_optimization_records_its_outcome() {
    let (_cache, optimizer, _db, _manager) = build_stack();

    let result = optimizer.force_optimization("cache").await.unwrap();
    assert!(result.success);
    assert_eq!(result.optimization_type, "cache_degradation");
    assert!(result.improvements.contains_key("local_entries_swept"));

    let history = optimizer.optimization_history(10);
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn unknown_optimization_kinds_are_rejected() {
    let (_cache, optimizer, _db, _manager) = build_stack();
    assert!(optimizer.force_optimization("defragment-ram").await.is_err());
}

#[tokio::test]
async fn manager_start_is_idempotent_and_stop_cancels_tasks() {
    let (_cache, _optimizer, _db, manager) = build_stack();

    manager.start();
    assert!(manager.is_running());
    manager.start();
    assert!(manager.is_running());

    manager.stop().await;
    assert!(!manager.is_running());
    // A second stop is a no-op
    manager.stop().await;
}

#[tokio::test]
async fn slow_queries_plus_poor_app_health_raise_the_correlated_alert() {
    let (_cache, optimizer, db_monitor, manager) = build_stack();

    // Degraded application: a CPU sample far over its critical threshold
    optimizer.record_metric(METRIC_CPU, 97.0, "%");
    // A burst of slow queries inside the correlation window
    for i in 0..5 {
        db_monitor.record_query(
            &format!("SELECT heavy_{} FROM positions", i),
            Duration::from_millis(400),
            None,
        );
    }

    manager.correlation_cycle().await;

    let alerts = manager.get_active_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, "database_application_pressure");

    // Same conditions on the next cycle must not duplicate the alert
    manager.correlation_cycle().await;
    assert_eq!(manager.get_active_alerts().len(), 1);

    // Once the application recovers the alert auto-resolves
    optimizer.record_metric(METRIC_CPU, 5.0, "%");
    manager.correlation_cycle().await;
    assert!(manager.get_active_alerts().is_empty());
}

#[tokio::test]
async fn healthy_stack_produces_no_correlated_alerts() {
    let (_cache, optimizer, _db, manager) = build_stack();
    optimizer.record_metric(METRIC_CPU, 10.0, "%");
    optimizer.record_metric(METRIC_API_LATENCY, 50.0, "ms");

    manager.correlation_cycle().await;
    assert!(manager.get_active_alerts().is_empty());
}

#[tokio::test]
async fn reports_combine_health_issues_and_history() {
    let (_cache, optimizer, db_monitor, manager) = build_stack();

    optimizer.force_optimization("memory").await.unwrap();
    db_monitor.record_query("SELECT 1", Duration::from_millis(1), None);
    db_monitor.run_analysis().await;

    let report = manager.get_performance_report().await;
    assert!(report.health.overall_score > 0.0);
    assert_eq!(report.health.components.len(), 3);
    assert_eq!(report.database.as_ref().unwrap().total_executions, 1);
    assert_eq!(report.recent_optimizations.len(), 1);
    assert_eq!(manager.last_report().unwrap().generated_at, report.generated_at);
}

#[tokio::test]
async fn system_status_summarizes_the_stack() {
    let (_cache, _optimizer, _db, manager) = build_stack();
    manager.start();

    let status = manager.get_system_status().await;
    assert!(status.running);
    assert_eq!(status.active_alerts, 0);

    manager.stop().await;
    let status = manager.get_system_status().await;
    assert!(!status.running);
}

#[tokio::test]
async fn database_force_optimization_runs_the_maintenance_set() {
    let (_cache, optimizer, _db, manager) = build_stack();

    let results = manager.force_optimization("database").await.unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.success));
    // Maintenance outcomes land in the shared history
    assert_eq!(optimizer.optimization_history(10).len(), 4);
    assert_eq!(manager.get_optimization_history(2).len(), 2);
}
