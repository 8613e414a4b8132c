// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Issue registry and optimization history

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use super::metrics::PerformanceMetric;

/// Issue/alert severity; escalation moves one step up
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn escalated(self) -> Self {
        match self {
            Severity::Low => Severity::Medium,
            Severity::Medium => Severity::High,
            Severity::High | Severity::Critical => Severity::Critical,
        }
    }

    /// Health-score penalty for an open issue of this severity
    pub fn penalty(self) -> f64 {
        match self {
            Severity::Low => 5.0,
            Severity::Medium => 10.0,
            Severity::High => 20.0,
            Severity::Critical => 30.0,
        }
    }
}

/// Known issue classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    CpuSaturation,
    MemoryPressure,
    DiskPressure,
    CacheDegradation,
    SustainedDegradation,
    SlowQueries,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::CpuSaturation => "cpu_saturation",
            IssueType::MemoryPressure => "memory_pressure",
            IssueType::DiskPressure => "disk_pressure",
            IssueType::CacheDegradation => "cache_degradation",
            IssueType::SustainedDegradation => "sustained_degradation",
            IssueType::SlowQueries => "slow_queries",
        }
    }

    /// Whether the auto-fix registry has a remediation for this class
    pub fn auto_fixable(&self) -> bool {
        matches!(
            self,
            IssueType::MemoryPressure | IssueType::CacheDegradation
        )
    }
}

/// One detected performance issue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceIssue {
    pub id: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub metrics: Vec<PerformanceMetric>,
    pub suggestions: Vec<String>,
    pub auto_fix_available: bool,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_escalated: Option<DateTime<Utc>>,
}

/// Registry deduplicating issues by `(type, metric)` while open
#[derive(Debug, Default)]
pub struct IssueRegistry {
    open: Mutex<HashMap<String, PerformanceIssue>>,
}

impl IssueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(issue_type: IssueType, metric_name: &str) -> String {
        format!("{}:{}", issue_type.as_str(), metric_name)
    }

    /// Open an issue unless one is already open for `(type, metric)`.
    /// Returns the issue id when a new issue was created.
    pub fn open_issue(
        &self,
        issue_type: IssueType,
        metric_name: &str,
        severity: Severity,
        description: String,
        metrics: Vec<PerformanceMetric>,
        suggestions: Vec<String>,
    ) -> Option<String> {
        let key = Self::key(issue_type, metric_name);
        let mut open = self.open.lock();
        if open.get(&key).is_some_and(|issue| !issue.resolved) {
            return None;
        }
        let issue = PerformanceIssue {
            id: key.clone(),
            issue_type,
            severity,
            description,
            detected_at: Utc::now(),
            metrics,
            suggestions,
            auto_fix_available: issue_type.auto_fixable(),
            resolved: false,
            resolved_at: None,
            last_escalated: None,
        };
        log::warn!(
            "performance issue opened: {} ({:?})",
            issue.description,
            issue.severity
        );
        open.insert(key.clone(), issue);
        Some(key)
    }

    /// Resolve the open issue for `(type, metric)` if any
    pub fn resolve(&self, issue_type: IssueType, metric_name: &str) -> bool {
        let key = Self::key(issue_type, metric_name);
        let mut open = self.open.lock();
        match open.get_mut(&key) {
            Some(issue) if !issue.resolved => {
                issue.resolved = true;
                issue.resolved_at = Some(Utc::now());
                log::info!("performance issue resolved: {}", issue.id);
                true
            }
            _ => false,
        }
    }

    /// All unresolved issues
    pub fn open_issues(&self) -> Vec<PerformanceIssue> {
        self.open
            .lock()
            .values()
            .filter(|issue| !issue.resolved)
            .cloned()
            .collect()
    }

    /// Drop resolved issues, returning the count removed
    pub fn prune_resolved(&self) -> usize {
        let mut open = self.open.lock();
        let before = open.len();
        open.retain(|_, issue| !issue.resolved);
        before - open.len()
    }

    /// Escalate issues unresolved past `timeout` one severity step;
    /// returns the count escalated
    pub fn escalate_stale(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> usize {
        let mut open = self.open.lock();
        let mut escalated = 0;
        for issue in open.values_mut().filter(|i| !i.resolved) {
            let since = issue.last_escalated.unwrap_or(issue.detected_at);
            if now - since >= timeout && issue.severity != Severity::Critical {
                issue.severity = issue.severity.escalated();
                issue.last_escalated = Some(now);
                log::warn!(
                    "issue {} escalated to {:?} after staying unresolved",
                    issue.id,
                    issue.severity
                );
                escalated += 1;
            }
        }
        escalated
    }
}

/// Result of one remediation attempt; history is append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub optimization_type: String,
    pub success: bool,
    pub improvements: HashMap<String, f64>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Bounded append-only remediation history
#[derive(Debug)]
pub struct OptimizationHistory {
    entries: Mutex<VecDeque<OptimizationResult>>,
    capacity: usize,
}

impl OptimizationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn push(&self, result: OptimizationResult) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(result);
    }

    /// Most recent `limit` results, newest first
    pub fn recent(&self, limit: usize) -> Vec<OptimizationResult> {
        self.entries
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_issues_are_not_opened_while_one_is_active() {
        let registry = IssueRegistry::new();
        let first = registry.open_issue(
            IssueType::MemoryPressure,
            "memory_percent",
            Severity::Medium,
            "memory above warning".to_string(),
            vec![],
            vec![],
        );
        let second = registry.open_issue(
            IssueType::MemoryPressure,
            "memory_percent",
            Severity::High,
            "memory above warning".to_string(),
            vec![],
            vec![],
        );
        assert!(first.is_some());
        assert!(second.is_none());

        assert!(registry.resolve(IssueType::MemoryPressure, "memory_percent"));
        let reopened = registry.open_issue(
            IssueType::MemoryPressure,
            "memory_percent",
            Severity::Medium,
            "memory above warning again".to_string(),
            vec![],
            vec![],
        );
        assert!(reopened.is_some());
    }

    #[test]
    fn history_is_bounded_and_newest_first() {
        let history = OptimizationHistory::new(2);
        for i in 0..3 {
            history.push(OptimizationResult {
                optimization_type: format!("op{}", i),
                success: true,
                improvements: HashMap::new(),
                errors: vec![],
                duration_ms: i,
                timestamp: Utc::now(),
            });
        }
        let recent = history.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].optimization_type, "op2");
    }

    #[test]
    fn escalation_tops_out_at_critical() {
        assert_eq!(Severity::Low.escalated(), Severity::Medium);
        assert_eq!(Severity::Critical.escalated(), Severity::Critical);
    }

    #[test]
    fn stale_open_issues_escalate_one_step_per_timeout() {
        let registry = IssueRegistry::new();
        registry.open_issue(
            IssueType::CpuSaturation,
            "cpu_percent",
            Severity::Medium,
            "cpu above warning".to_string(),
            vec![],
            vec![],
        );
        let timeout = chrono::Duration::minutes(30);

        // Not stale yet
        assert_eq!(registry.escalate_stale(Utc::now(), timeout), 0);

        let later = Utc::now() + chrono::Duration::minutes(31);
        assert_eq!(registry.escalate_stale(later, timeout), 1);
        assert_eq!(registry.open_issues()[0].severity, Severity::High);

        // The clock restarts from the escalation, not the detection
        assert_eq!(registry.escalate_stale(later, timeout), 0);
    }
}
