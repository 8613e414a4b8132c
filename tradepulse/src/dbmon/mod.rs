// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Database monitoring: fingerprinting, slow-query log, index analysis

pub mod fingerprint;
pub mod index_analysis;
pub mod monitor;
pub mod stats;

pub use fingerprint::{fingerprint, normalize, QueryFingerprint};
pub use index_analysis::{IndexAnalysisReport, IndexAnalyzer, IndexInfo};
pub use monitor::{
    DatabaseAdmin, DatabaseMonitor, DbAdminError, DbMonitorConfig, DbMonitorSnapshot,
};
pub use stats::{QueryStats, QueryTracker, SlowQueryRecord};
