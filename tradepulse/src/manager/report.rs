// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Report and status snapshots for the operational surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alerts::PerformanceAlert;
use super::health::SystemHealthReport;
use crate::cache::{CacheHealthReport, CacheStatsReport};
use crate::dbmon::DbMonitorSnapshot;
use crate::perf::{HealthLevel, OptimizationResult, PerformanceIssue, PerformanceMetric};

/// Periodic snapshot combining every monitoring view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub health: SystemHealthReport,
    pub cache_health: CacheHealthReport,
    pub cache_stats: CacheStatsReport,
    pub database: Option<DbMonitorSnapshot>,
    pub latest_metrics: Vec<PerformanceMetric>,
    pub open_issues: Vec<PerformanceIssue>,
    pub recommendations: Vec<String>,
    pub recent_optimizations: Vec<OptimizationResult>,
    pub active_alerts: Vec<PerformanceAlert>,
}

/// Light-weight status line for dashboards and probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub running: bool,
    pub health_level: HealthLevel,
    pub health_score: f64,
    pub open_issues: usize,
    pub active_alerts: usize,
    pub local_cache_entries: usize,
    pub uptime_seconds: u64,
    pub generated_at: DateTime<Utc>,
}
