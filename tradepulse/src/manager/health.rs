// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! System health scoring
//!
//! Each component starts at 100 and loses fixed penalties per open issue
//! (scaled by severity) and per adverse condition. The overall score is
//! the mean of the component scores; the level is a step function of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheStatsReport;
use crate::dbmon::DbMonitorSnapshot;
use crate::perf::{HealthLevel, PerformanceIssue};

/// Score and context for one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScore {
    pub name: String,
    pub score: f64,
    pub level: HealthLevel,
    pub notes: Vec<String>,
}

/// Composite system health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealthReport {
    pub overall_score: f64,
    pub level: HealthLevel,
    pub components: Vec<ComponentScore>,
    pub generated_at: DateTime<Utc>,
}

/// Inputs for the database component score
#[derive(Debug, Clone, Default)]
pub struct DbHealthInputs {
    pub recent_slow_queries: usize,
    pub slow_query_threshold: usize,
    pub database_size_bytes: Option<u64>,
    pub size_threshold_bytes: u64,
    pub fragmented_tables: usize,
}

impl DbHealthInputs {
    pub fn from_snapshot(
        snapshot: Option<&DbMonitorSnapshot>,
        recent_slow_queries: usize,
        slow_query_threshold: usize,
        size_threshold_bytes: u64,
    ) -> Self {
        Self {
            recent_slow_queries,
            slow_query_threshold,
            database_size_bytes: snapshot.and_then(|s| s.database_size_bytes),
            size_threshold_bytes,
            fragmented_tables: snapshot.map(|s| s.fragmented_tables.len()).unwrap_or(0),
        }
    }
}

/// Compute the composite report from the three component views
pub fn compute_health(
    app_issues: &[PerformanceIssue],
    cache_stats: &CacheStatsReport,
    shared_tier_ok: bool,
    db: &DbHealthInputs,
) -> SystemHealthReport {
    let application = score_application(app_issues);
    let cache = score_cache(cache_stats, shared_tier_ok);
    let database = score_database(db);

    let overall_score =
        (application.score + cache.score + database.score) / 3.0;

    SystemHealthReport {
        overall_score,
        level: HealthLevel::from_score(overall_score),
        components: vec![application, cache, database],
        generated_at: Utc::now(),
    }
}

fn score_application(issues: &[PerformanceIssue]) -> ComponentScore {
    let mut score = 100.0;
    let mut notes = Vec::new();
    for issue in issues.iter().filter(|i| !i.resolved) {
        score -= issue.severity.penalty();
        notes.push(format!("{} ({:?})", issue.description, issue.severity));
    }
    finish("application", score, notes)
}

fn score_cache(stats: &CacheStatsReport, shared_tier_ok: bool) -> ComponentScore {
    let mut score = 100.0;
    let mut notes = Vec::new();

    if !shared_tier_ok {
        score -= 30.0;
        notes.push("shared tier unreachable".to_string());
    }
    let requests: u64 = stats
        .per_type
        .values()
        .map(|s| s.hits + s.misses)
        .sum();
    if requests >= 100 && stats.overall_hit_rate < 0.5 {
        score -= 15.0;
        notes.push(format!(
            "hit rate {:.0}% below 50%",
            stats.overall_hit_rate * 100.0
        ));
    }
    if stats.local_utilization > 0.9 {
        score -= 10.0;
        notes.push("local tier near its entry budget".to_string());
    }
    let error_count: u64 = stats.per_type.values().map(|s| s.errors).sum();
    if error_count > 0 {
        score -= 10.0;
        notes.push(format!("{} backend errors recorded", error_count));
    }

    finish("cache", score, notes)
}

fn score_database(inputs: &DbHealthInputs) -> ComponentScore {
    let mut score = 100.0;
    let mut notes = Vec::new();

    if inputs.recent_slow_queries > inputs.slow_query_threshold {
        score -= 15.0;
        notes.push(format!(
            "{} slow queries in the recent window",
            inputs.recent_slow_queries
        ));
    }
    if let Some(size) = inputs.database_size_bytes {
        if size > inputs.size_threshold_bytes {
            score -= 10.0;
            notes.push(format!(
                "database size {} MB over threshold",
                size / (1024 * 1024)
            ));
        }
    }
    if inputs.fragmented_tables > 0 {
        score -= (inputs.fragmented_tables as f64 * 5.0).min(20.0);
        notes.push(format!("{} fragmented tables", inputs.fragmented_tables));
    }

    finish("database", score, notes)
}

fn finish(name: &str, score: f64, notes: Vec<String>) -> ComponentScore {
    let score = score.clamp(0.0, 100.0);
    ComponentScore {
        name: name.to_string(),
        score,
        level: HealthLevel::from_score(score),
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf::{IssueType, Severity};
    use chrono::Utc;
    use std::collections::HashMap;

    fn issue(severity: Severity) -> PerformanceIssue {
        PerformanceIssue {
            id: "t:m".to_string(),
            issue_type: IssueType::MemoryPressure,
            severity,
            description: "test".to_string(),
            detected_at: Utc::now(),
            metrics: vec![],
            suggestions: vec![],
            auto_fix_available: false,
            resolved: false,
            resolved_at: None,
            last_escalated: None,
        }
    }

    fn clean_cache_stats() -> CacheStatsReport {
        CacheStatsReport {
            per_type: HashMap::new(),
            local_entries: 0,
            local_utilization: 0.0,
            overall_hit_rate: 1.0,
        }
    }

    #[test]
    fn critical_issue_scores_no_better_than_warning_issue() {
        let warning_state = vec![issue(Severity::Medium)];
        let critical_state = vec![issue(Severity::Critical)];
        let db = DbHealthInputs::default();

        let a = compute_health(&warning_state, &clean_cache_stats(), true, &db);
        let b = compute_health(&critical_state, &clean_cache_stats(), true, &db);
        assert!(b.overall_score <= a.overall_score);
    }

    #[test]
    fn pristine_state_is_excellent() {
        let report = compute_health(&[], &clean_cache_stats(), true, &DbHealthInputs::default());
        assert_eq!(report.overall_score, 100.0);
        assert_eq!(report.level, HealthLevel::Excellent);
    }

    #[test]
    fn component_scores_never_go_negative() {
        let issues: Vec<PerformanceIssue> =
            (0..10).map(|_| issue(Severity::Critical)).collect();
        let report = compute_health(&issues, &clean_cache_stats(), true, &DbHealthInputs::default());
        let app = &report.components[0];
        assert_eq!(app.score, 0.0);
    }

    #[test]
    fn adverse_db_conditions_subtract_fixed_penalties() {
        let db = DbHealthInputs {
            recent_slow_queries: 50,
            slow_query_threshold: 10,
            database_size_bytes: Some(20 * 1024 * 1024 * 1024),
            size_threshold_bytes: 10 * 1024 * 1024 * 1024,
            fragmented_tables: 1,
        };
        let report = compute_health(&[], &clean_cache_stats(), true, &db);
        let database = report
            .components
            .iter()
            .find(|c| c.name == "database")
            .unwrap();
        assert_eq!(database.score, 70.0);
    }
}
