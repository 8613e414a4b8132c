// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! TradePulse - tiered caching and adaptive performance management core
//!
//! TradePulse is the caching and self-monitoring core of a trading
//! education platform backend.
//!
//! # Features
//!
//! - **Tiered cache**: fast process-local tier over a durable shared tier,
//!   with per-data-type TTL, codec and bounds
//! - **Domain services**: typed market-data, session and AI-context
//!   caches over the same store
//! - **Performance optimizer**: periodic system sampling, threshold and
//!   trend classification, auto-remediation with recorded outcomes
//! - **Database monitor**: query fingerprinting, slow-query ring, index
//!   usage analysis and isolated maintenance actions
//! - **Unified manager**: cross-component correlation, 0-100 health
//!   scoring, alert lifecycle and periodic reports
//!
//! # Usage
//!
//! Construct a [`CacheFacade`] once at process start, wire the optimizer
//! and database monitor into a [`UnifiedPerformanceManager`], and pass
//! the services by reference to request handlers:
//!
//! ```ignore
//! let cache = Arc::new(CacheFacade::init(StoreConfig::default())?);
//! let optimizer = Arc::new(PerformanceOptimizer::new(
//!     OptimizerConfig::default(),
//!     cache.store().clone(),
//! ));
//! let db_monitor = Arc::new(DatabaseMonitor::new(DbMonitorConfig::default(), admin));
//! let manager = Arc::new(UnifiedPerformanceManager::new(
//!     ManagerConfig::default(),
//!     cache.clone(),
//!     optimizer,
//!     db_monitor,
//! ));
//! manager.start();
//! ```

// Public modules
pub mod aicontext;
pub mod cache;
pub mod dbmon;
pub mod manager;
pub mod market;
pub mod perf;
pub mod session;
pub mod validate;

// Re-export the public API - the facade and the manager are the entry points
pub use cache::{
    CacheError, CacheFacade, CacheHealthReport, CacheRegistry, CacheStatsReport, CacheStore,
    Compression, DataTypeConfig, HealthStatus, SharedTier, SledTier, StoreConfig,
};
pub use dbmon::{DatabaseAdmin, DatabaseMonitor, DbAdminError, DbMonitorConfig};
pub use manager::{
    ManagerConfig, PerformanceAlert, PerformanceReport, SystemHealthReport, SystemStatus,
    UnifiedPerformanceManager,
};
pub use perf::{
    HealthLevel, MonitorError, OptimizationResult, OptimizerConfig, PerformanceIssue,
    PerformanceMetric, PerformanceOptimizer, Severity,
};

/// TradePulse version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TradePulse crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
