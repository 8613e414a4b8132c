// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Cache facade: lifecycle, unified surface, health and stats
//!
//! The facade is the one object business code holds. It owns the tiered
//! store and the domain services, and aggregates their health for the
//! operational surface. Construction is the only fallible step in the
//! subsystem; everything after init degrades instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::config::{CacheRegistry, StoreConfig};
use super::error::CacheError;
use super::metrics::CacheMetricsSnapshot;
use super::shared::{SharedTier, SledTier};
use super::store::{standard_registry, CacheStore};
use crate::aicontext::AiContextCache;
use crate::market::MarketCache;
use crate::session::SessionService;

/// Overall facade health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health of one cache component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

/// Aggregated health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub recommendations: Vec<String>,
}

/// Aggregated statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub per_type: HashMap<String, CacheMetricsSnapshot>,
    pub local_entries: usize,
    pub local_utilization: f64,
    pub overall_hit_rate: f64,
}

/// Unified cache entry point
pub struct CacheFacade {
    store: Arc<CacheStore>,
    market: MarketCache,
    sessions: SessionService,
    ai: AiContextCache,
}

impl CacheFacade {
    /// Initialize the subsystem with the standard data-type registry
    ///
    /// This is the one fatal path: a store that cannot be built (e.g. the
    /// durable tier cannot be opened) surfaces here, once.
    pub fn init(config: StoreConfig) -> Result<Self, CacheError> {
        let registry = standard_registry()?;
        Self::init_with(config, registry)
    }

    /// Initialize with a caller-extended registry
    pub fn init_with(config: StoreConfig, registry: CacheRegistry) -> Result<Self, CacheError> {
        let shared: Arc<dyn SharedTier> = match &config.shared_tier_path {
            Some(path) => Arc::new(SledTier::open(path)?),
            None => Arc::new(SledTier::open_temporary()?),
        };
        Self::init_with_tier(config, registry, shared)
    }

    /// Initialize over a caller-provided shared tier
    pub fn init_with_tier(
        config: StoreConfig,
        registry: CacheRegistry,
        shared: Arc<dyn SharedTier>,
    ) -> Result<Self, CacheError> {
        let store = Arc::new(
            CacheStore::new(&config, registry, shared)
                .map_err(|e| CacheError::Initialization(e.to_string()))?,
        );
        log::info!(
            "cache facade initialized with {} registered data types",
            store.registered_types().len()
        );
        Ok(Self {
            market: MarketCache::new(store.clone()),
            sessions: SessionService::new(store.clone()),
            ai: AiContextCache::new(store.clone()),
            store,
        })
    }

    /// Flush the durable tier and log final statistics
    pub async fn shutdown(&self) {
        if let Err(e) = self.store.flush().await {
            log::warn!("shared tier flush during shutdown failed: {}", e);
        }
        let stats = self.stats();
        log::info!(
            "cache facade shut down: {} local entries, overall hit rate {:.1}%",
            stats.local_entries,
            stats.overall_hit_rate * 100.0
        );
    }

    // === Unified surface ===

    pub async fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        self.store.get(namespace, key).await
    }

    /// Get a value, producing and storing it through `fallback` on a
    /// full miss
    pub async fn get_with<F, Fut>(&self, namespace: &str, key: &str, fallback: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Option<Value>>,
    {
        self.store.get_with(namespace, key, fallback).await
    }

    pub async fn set(&self, namespace: &str, key: &str, value: Value) -> bool {
        self.store.set(namespace, key, value).await
    }

    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        self.store.delete(namespace, key).await
    }

    pub async fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.exists(namespace, key).await
    }

    pub async fn expire(&self, namespace: &str, key: &str, ttl: Duration) -> bool {
        self.store.expire(namespace, key, ttl).await
    }

    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        self.store.clear_namespace(namespace).await
    }

    // === Domain services ===

    pub fn market(&self) -> &MarketCache {
        &self.market
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn ai(&self) -> &AiContextCache {
        &self.ai
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    // === Health and stats ===

    pub async fn health(&self) -> CacheHealthReport {
        let mut components = Vec::new();

        let utilization = self.store.local_utilization();
        components.push(ComponentHealth {
            name: "local_tier".to_string(),
            status: if utilization < 0.95 {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            message: Some(format!("{:.0}% of entry budget", utilization * 100.0)),
        });

        let shared_ok = self.store.shared_tier_healthy().await;
        components.push(ComponentHealth {
            name: "shared_tier".to_string(),
            status: if shared_ok {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            message: (!shared_ok).then(|| "backend unreachable, serving local tier only".to_string()),
        });

        let stats = self.stats();
        let requests: u64 = stats
            .per_type
            .values()
            .map(|s| s.hits + s.misses)
            .sum();
        components.push(ComponentHealth {
            name: "hit_rate".to_string(),
            status: if requests < 100 || stats.overall_hit_rate >= 0.3 {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            message: Some(format!("{:.1}%", stats.overall_hit_rate * 100.0)),
        });

        // An unreachable shared tier degrades the facade rather than
        // failing it: the local tier keeps serving.
        let status = if components.iter().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        CacheHealthReport {
            recommendations: self.recommendations(&stats, shared_ok),
            status,
            components,
        }
    }

    pub fn stats(&self) -> CacheStatsReport {
        let per_type = self.store.metrics_snapshot();
        let (hits, requests) = per_type.values().fold((0u64, 0u64), |(h, r), s| {
            (h + s.hits, r + s.hits + s.misses)
        });
        CacheStatsReport {
            local_entries: self.store.local_entry_count(),
            local_utilization: self.store.local_utilization(),
            overall_hit_rate: if requests == 0 {
                0.0
            } else {
                hits as f64 / requests as f64
            },
            per_type,
        }
    }

    fn recommendations(&self, stats: &CacheStatsReport, shared_ok: bool) -> Vec<String> {
        let mut recommendations = Vec::new();

        if !shared_ok {
            recommendations.push(
                "Shared tier is unreachable; entries will not survive process restarts."
                    .to_string(),
            );
        }
        let requests: u64 = stats.per_type.values().map(|s| s.hits + s.misses).sum();
        if requests >= 100 && stats.overall_hit_rate < 0.3 {
            recommendations.push(
                "Hit rate is low (<30%). Review TTLs or key layout for the hot data types."
                    .to_string(),
            );
        }
        if stats.local_utilization > 0.9 {
            recommendations.push(
                "Local tier is over 90% of its entry budget; consider raising local_max_entries."
                    .to_string(),
            );
        }
        let error_types: Vec<&String> = stats
            .per_type
            .iter()
            .filter(|(_, s)| s.errors > 0)
            .map(|(name, _)| name)
            .collect();
        if !error_types.is_empty() {
            recommendations.push(format!(
                "Backend errors recorded for: {}",
                error_types
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        recommendations
    }
}
