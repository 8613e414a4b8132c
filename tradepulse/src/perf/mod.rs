// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Performance monitoring: sampling, trend detection, auto-remediation

pub mod error;
pub mod issues;
pub mod metrics;
pub mod optimizer;
pub mod trend;

pub use error::MonitorError;
pub use issues::{
    IssueRegistry, IssueType, OptimizationHistory, OptimizationResult, PerformanceIssue, Severity,
};
pub use metrics::{HealthLevel, PerformanceMetric};
pub use optimizer::{OptimizerConfig, PerformanceOptimizer};
pub use trend::TrendTracker;
