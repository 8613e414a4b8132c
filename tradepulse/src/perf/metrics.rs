// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Performance metric model and threshold classification

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Step-function health levels shared by metrics and the system score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Excellent,
    Good,
    Average,
    Poor,
    Critical,
}

impl HealthLevel {
    /// Map an overall 0-100 score to its level
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthLevel::Excellent
        } else if score >= 75.0 {
            HealthLevel::Good
        } else if score >= 60.0 {
            HealthLevel::Average
        } else if score >= 40.0 {
            HealthLevel::Poor
        } else {
            HealthLevel::Critical
        }
    }

    pub fn is_poor_or_worse(&self) -> bool {
        matches!(self, HealthLevel::Poor | HealthLevel::Critical)
    }
}

/// One sampled metric with its classification thresholds
///
/// The level is always computed from `value` against the thresholds; it
/// is never stored, so it cannot drift from the sample it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub warning_threshold: Option<f64>,
    pub critical_threshold: Option<f64>,
}

impl PerformanceMetric {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        let name = name.into();
        let (warning, critical) = match default_thresholds(&name) {
            Some((w, c)) => (Some(w), Some(c)),
            None => (None, None),
        };
        Self {
            name,
            value,
            unit: unit.into(),
            timestamp: Utc::now(),
            warning_threshold: warning,
            critical_threshold: critical,
        }
    }

    pub fn with_thresholds(mut self, warning: f64, critical: f64) -> Self {
        self.warning_threshold = Some(warning);
        self.critical_threshold = Some(critical);
        self
    }

    /// Classification of this sample, independent of any history
    pub fn level(&self) -> HealthLevel {
        if let Some(critical) = self.critical_threshold {
            if self.value >= critical {
                return HealthLevel::Critical;
            }
        }
        if let Some(warning) = self.warning_threshold {
            if self.value >= warning {
                return HealthLevel::Poor;
            }
            if self.value >= warning * 0.8 {
                return HealthLevel::Average;
            }
        }
        HealthLevel::Good
    }
}

// Sampled metric names
pub const METRIC_CPU: &str = "cpu_percent";
pub const METRIC_MEMORY: &str = "memory_percent";
pub const METRIC_DISK: &str = "disk_percent";
pub const METRIC_PROCESS_RSS: &str = "process_rss_mb";
pub const METRIC_LOAD_AVG: &str = "load_average_1m";
pub const METRIC_TASKS: &str = "monitored_tasks";
/// Derived from cache counters once enough requests have been seen
pub const METRIC_CACHE_MISS_RATE: &str = "cache_miss_rate_percent";
/// Reported by request-handling code, not sampled here
pub const METRIC_API_LATENCY: &str = "api_latency_ms";

/// Static `{warning, critical}` table for well-known metrics
pub fn default_thresholds(name: &str) -> Option<(f64, f64)> {
    match name {
        METRIC_CPU => Some((70.0, 90.0)),
        METRIC_MEMORY => Some((75.0, 90.0)),
        METRIC_DISK => Some((80.0, 95.0)),
        METRIC_PROCESS_RSS => Some((1024.0, 2048.0)),
        METRIC_LOAD_AVG => Some((4.0, 8.0)),
        METRIC_TASKS => Some((100.0, 200.0)),
        METRIC_CACHE_MISS_RATE => Some((60.0, 85.0)),
        METRIC_API_LATENCY => Some((500.0, 2000.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_follows_thresholds() {
        let below = PerformanceMetric::new(METRIC_CPU, 40.0, "%");
        let near = PerformanceMetric::new(METRIC_CPU, 60.0, "%");
        let warn = PerformanceMetric::new(METRIC_CPU, 75.0, "%");
        let crit = PerformanceMetric::new(METRIC_CPU, 95.0, "%");

        assert_eq!(below.level(), HealthLevel::Good);
        assert_eq!(near.level(), HealthLevel::Average);
        assert_eq!(warn.level(), HealthLevel::Poor);
        assert_eq!(crit.level(), HealthLevel::Critical);
    }

    #[test]
    fn unknown_metric_without_thresholds_is_good() {
        let metric = PerformanceMetric::new("custom_gauge", 1e9, "units");
        assert_eq!(metric.level(), HealthLevel::Good);
    }

    #[test]
    fn score_steps_match_the_ladder() {
        assert_eq!(HealthLevel::from_score(92.0), HealthLevel::Excellent);
        assert_eq!(HealthLevel::from_score(80.0), HealthLevel::Good);
        assert_eq!(HealthLevel::from_score(61.0), HealthLevel::Average);
        assert_eq!(HealthLevel::from_score(45.0), HealthLevel::Poor);
        assert_eq!(HealthLevel::from_score(10.0), HealthLevel::Critical);
    }
}
