// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Alert lifecycle
//!
//! Alerts are deduplicated by id, escalate one severity step when they
//! stay unresolved past the escalation timeout, and once resolved are
//! kept for a retention window before moving to a bounded history.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::perf::Severity;

/// One operational alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub id: String,
    pub severity: Severity,
    pub component: String,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub metrics: Value,
    pub auto_resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_escalated: Option<DateTime<Utc>>,
}

impl PerformanceAlert {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

/// Alert center tuning knobs
#[derive(Debug, Clone)]
pub struct AlertConfig {
    /// Unresolved alerts escalate one severity step after this long
    pub escalation_timeout: Duration,
    /// Resolved alerts leave the active set after this long
    pub retention: Duration,
    /// Bound on the resolved-alert history
    pub history_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            escalation_timeout: Duration::from_secs(30 * 60),
            retention: Duration::from_secs(24 * 60 * 60),
            history_capacity: 500,
        }
    }
}

/// Active alert set plus bounded resolved history
pub struct AlertCenter {
    config: AlertConfig,
    active: Mutex<HashMap<String, PerformanceAlert>>,
    history: Mutex<VecDeque<PerformanceAlert>>,
}

impl AlertCenter {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Raise an alert; returns false when the id is already active
    pub fn raise(
        &self,
        id: &str,
        severity: Severity,
        component: &str,
        message: String,
        metrics: Value,
    ) -> bool {
        let mut active = self.active.lock();
        if active.get(id).is_some_and(|a| !a.is_resolved()) {
            return false;
        }
        log::warn!("alert raised [{}] {}: {}", component, id, message);
        active.insert(
            id.to_string(),
            PerformanceAlert {
                id: id.to_string(),
                severity,
                component: component.to_string(),
                message,
                detected_at: Utc::now(),
                metrics,
                auto_resolved: false,
                resolved_at: None,
                last_escalated: None,
            },
        );
        true
    }

    /// Resolve an active alert; `auto` marks condition-cleared resolution
    pub fn resolve(&self, id: &str, auto: bool) -> bool {
        let mut active = self.active.lock();
        match active.get_mut(id) {
            Some(alert) if !alert.is_resolved() => {
                alert.resolved_at = Some(Utc::now());
                alert.auto_resolved = auto;
                log::info!(
                    "alert resolved{} [{}] {}",
                    if auto { " automatically" } else { "" },
                    alert.component,
                    id
                );
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.lock().get(id).is_some_and(|a| !a.is_resolved())
    }

    /// Escalation and retention pass
    pub fn lifecycle_tick(&self, now: DateTime<Utc>) {
        let escalation =
            ChronoDuration::from_std(self.config.escalation_timeout).unwrap_or_else(|_| ChronoDuration::minutes(30));
        let retention = ChronoDuration::from_std(self.config.retention)
            .unwrap_or_else(|_| ChronoDuration::hours(24));

        let mut active = self.active.lock();

        for alert in active.values_mut().filter(|a| !a.is_resolved()) {
            let since = alert.last_escalated.unwrap_or(alert.detected_at);
            if now - since >= escalation && alert.severity != Severity::Critical {
                alert.severity = alert.severity.escalated();
                alert.last_escalated = Some(now);
                log::warn!(
                    "alert {} escalated to {:?} after staying unresolved",
                    alert.id,
                    alert.severity
                );
            }
        }

        let retired: Vec<String> = active
            .iter()
            .filter(|(_, a)| {
                a.resolved_at
                    .is_some_and(|resolved| now - resolved >= retention)
            })
            .map(|(id, _)| id.clone())
            .collect();
        if !retired.is_empty() {
            let mut history = self.history.lock();
            for id in retired {
                if let Some(alert) = active.remove(&id) {
                    if history.len() >= self.config.history_capacity {
                        history.pop_front();
                    }
                    history.push_back(alert);
                }
            }
        }
    }

    /// Unresolved alerts, newest first
    pub fn active_alerts(&self) -> Vec<PerformanceAlert> {
        let mut alerts: Vec<PerformanceAlert> = self
            .active
            .lock()
            .values()
            .filter(|a| !a.is_resolved())
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        alerts
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().values().filter(|a| !a.is_resolved()).count()
    }

    /// Retired alerts, newest first
    pub fn history(&self, limit: usize) -> Vec<PerformanceAlert> {
        self.history
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn center() -> AlertCenter {
        AlertCenter::new(AlertConfig::default())
    }

    #[test]
    fn duplicate_ids_do_not_raise_twice() {
        let alerts = center();
        assert!(alerts.raise("db_pressure", Severity::High, "database", "slow".into(), json!({})));
        assert!(!alerts.raise("db_pressure", Severity::High, "database", "slow".into(), json!({})));
        assert_eq!(alerts.active_count(), 1);
    }

    #[test]
    fn unresolved_alerts_escalate_after_the_timeout() {
        let alerts = center();
        alerts.raise("x", Severity::Medium, "cache", "m".into(), json!({}));

        alerts.lifecycle_tick(Utc::now() + ChronoDuration::minutes(31));
        let alert = &alerts.active_alerts()[0];
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn resolved_alerts_retire_to_history_after_retention() {
        let alerts = center();
        alerts.raise("x", Severity::Low, "cache", "m".into(), json!({}));
        assert!(alerts.resolve("x", true));
        assert_eq!(alerts.active_count(), 0);

        alerts.lifecycle_tick(Utc::now() + ChronoDuration::hours(25));
        assert!(!alerts.is_active("x"));
        let history = alerts.history(10);
        assert_eq!(history.len(), 1);
        assert!(history[0].auto_resolved);
    }

    #[test]
    fn resolving_allows_a_fresh_alert_under_the_same_id() {
        let alerts = center();
        alerts.raise("x", Severity::Low, "cache", "first".into(), json!({}));
        alerts.resolve("x", false);
        assert!(alerts.raise("x", Severity::Low, "cache", "second".into(), json!({})));
    }
}
