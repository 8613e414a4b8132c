// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Tiered key/value store
//!
//! Reads check the local tier first, then the shared tier (repopulating
//! the local tier on a hit), then an optional fallback producer. Writes go
//! to both tiers; the local tier stays authoritative when the shared tier
//! is down. No operation here returns an error to the caller: backend
//! failures are logged, counted, and treated as misses.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::codec;
use super::config::{CacheRegistry, Compression, DataTypeConfig, StoreConfig};
use super::error::CacheError;
use super::local::LocalTier;
use super::metrics::{CacheMetricsSnapshot, MetricsRegistry};
use super::shared::{SharedTier, StoredRecord};

/// Tiered cache store shared by all domain services
pub struct CacheStore {
    registry: CacheRegistry,
    local: LocalTier,
    shared: Arc<dyn SharedTier>,
    metrics: MetricsRegistry,
    default_ttl: Duration,
}

impl CacheStore {
    pub fn new(
        config: &StoreConfig,
        registry: CacheRegistry,
        shared: Arc<dyn SharedTier>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self {
            registry,
            local: LocalTier::new(config.local_max_entries),
            shared,
            metrics: MetricsRegistry::new(),
            default_ttl: Duration::from_secs(config.default_ttl_secs),
        })
    }

    fn policy(&self, namespace: &str) -> (String, Option<Duration>, Compression, Option<usize>) {
        match self.registry.get(namespace) {
            Some(config) => (
                config.namespace.clone(),
                ttl_from_secs(config.ttl_secs),
                config.compression,
                config.max_entries,
            ),
            None => {
                log::debug!("no registered config for '{}', using defaults", namespace);
                (
                    namespace.to_string(),
                    Some(self.default_ttl),
                    Compression::Json,
                    None,
                )
            }
        }
    }

    /// Get a value, checking local then shared tier
    pub async fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let started = Instant::now();
        let metrics = self.metrics.for_type(namespace);
        let (partition, ttl, _, cap) = self.policy(namespace);

        if let Some(value) = self.local.get(&partition, key) {
            metrics.record_hit(started.elapsed());
            return Some(value);
        }

        match self.shared.get(&partition, key).await {
            Ok(Some(record)) => {
                let value = codec::decode_async(record.payload, record.compression).await;
                let remaining = record
                    .expires_at_ms
                    .map(remaining_ttl)
                    .unwrap_or(ttl);
                self.local.set(&partition, key, value.clone(), remaining, cap);
                metrics.record_hit(started.elapsed());
                Some(value)
            }
            Ok(None) => {
                metrics.record_miss(started.elapsed());
                None
            }
            Err(e) => {
                log::warn!("shared tier get failed for {}:{}: {}", partition, key, e);
                metrics.record_error();
                metrics.record_miss(started.elapsed());
                None
            }
        }
    }

    /// Get a value, producing and storing it on a full miss
    pub async fn get_with<F, Fut>(&self, namespace: &str, key: &str, fallback: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<Value>>,
    {
        if let Some(value) = self.get(namespace, key).await {
            return Some(value);
        }
        let produced = fallback().await?;
        self.set(namespace, key, produced.clone()).await;
        Some(produced)
    }

    /// Write to both tiers; the local write always lands
    pub async fn set(&self, namespace: &str, key: &str, value: Value) -> bool {
        let metrics = self.metrics.for_type(namespace);
        let (partition, ttl, compression, cap) = self.policy(namespace);

        self.local.set(&partition, key, value.clone(), ttl, cap);
        metrics.record_write();

        match codec::encode_async(value, compression).await {
            Ok(payload) => {
                let record = StoredRecord::new(payload, compression, ttl);
                if let Err(e) = self.shared.put(&partition, key, record).await {
                    log::warn!(
                        "shared tier write failed for {}:{} (local tier remains authoritative): {}",
                        partition,
                        key,
                        e
                    );
                    metrics.record_error();
                }
            }
            Err(e) => {
                log::warn!("encode failed for {}:{}: {}", partition, key, e);
                metrics.record_error();
            }
        }
        true
    }

    /// Typed convenience wrapper over [`CacheStore::get`]
    pub async fn get_as<T: serde::de::DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Option<T> {
        let value = self.get(namespace, key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                log::warn!("typed decode failed for {}:{}: {}", namespace, key, e);
                self.metrics.for_type(namespace).record_error();
                None
            }
        }
    }

    /// Typed convenience wrapper over [`CacheStore::set`]
    pub async fn set_as<T: serde::Serialize>(&self, namespace: &str, key: &str, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(json) => self.set(namespace, key, json).await,
            Err(e) => {
                log::warn!("typed encode failed for {}:{}: {}", namespace, key, e);
                self.metrics.for_type(namespace).record_error();
                false
            }
        }
    }

    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        let metrics = self.metrics.for_type(namespace);
        let (partition, ..) = self.policy(namespace);

        let local_removed = self.local.delete(&partition, key);
        let shared_removed = match self.shared.delete(&partition, key).await {
            Ok(removed) => removed,
            Err(e) => {
                log::warn!("shared tier delete failed for {}:{}: {}", partition, key, e);
                metrics.record_error();
                false
            }
        };
        if local_removed || shared_removed {
            metrics.record_delete();
        }
        local_removed || shared_removed
    }

    pub async fn exists(&self, namespace: &str, key: &str) -> bool {
        let (partition, ..) = self.policy(namespace);
        if self.local.exists(&partition, key) {
            return true;
        }
        match self.shared.exists(&partition, key).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("shared tier exists failed for {}:{}: {}", partition, key, e);
                self.metrics.for_type(namespace).record_error();
                false
            }
        }
    }

    /// Reset the expiry of an entry in both tiers
    pub async fn expire(&self, namespace: &str, key: &str, ttl: Duration) -> bool {
        let (partition, ..) = self.policy(namespace);
        let local_reset = self.local.expire(&partition, key, ttl);
        let shared_reset = match self.shared.expire(&partition, key, ttl).await {
            Ok(reset) => reset,
            Err(e) => {
                log::warn!("shared tier expire failed for {}:{}: {}", partition, key, e);
                self.metrics.for_type(namespace).record_error();
                false
            }
        };
        local_reset || shared_reset
    }

    /// Clear a namespace in both tiers, returning the entry count removed
    pub async fn clear_namespace(&self, namespace: &str) -> usize {
        let (partition, ..) = self.policy(namespace);
        let local_cleared = self.local.clear_namespace(&partition);
        match self.shared.clear_namespace(&partition).await {
            Ok(shared_cleared) => local_cleared.max(shared_cleared),
            Err(e) => {
                log::warn!("shared tier clear failed for {}: {}", partition, e);
                self.metrics.for_type(namespace).record_error();
                local_cleared
            }
        }
    }

    /// Drop expired entries from both tiers, returning counts `(local, shared)`
    pub async fn sweep_expired(&self) -> (usize, usize) {
        let local = self.local.sweep_expired();
        let shared = match self.shared.sweep_expired().await {
            Ok(count) => count,
            Err(e) => {
                log::warn!("shared tier sweep failed: {}", e);
                0
            }
        };
        (local, shared)
    }

    /// Shared-tier liveness, used by facade health checks
    pub async fn shared_tier_healthy(&self) -> bool {
        match self.shared.ping().await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("shared tier ping failed: {}", e);
                false
            }
        }
    }

    pub async fn flush(&self) -> Result<(), CacheError> {
        self.shared.flush().await
    }

    pub fn local_entry_count(&self) -> usize {
        self.local.len()
    }

    pub fn local_utilization(&self) -> f64 {
        self.local.utilization()
    }

    pub fn metrics_snapshot(&self) -> std::collections::HashMap<String, CacheMetricsSnapshot> {
        self.metrics.snapshot_all()
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.registry.names().map(|s| s.to_string()).collect()
    }
}

fn ttl_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

fn remaining_ttl(expires_at_ms: i64) -> Option<Duration> {
    let left_ms = expires_at_ms - chrono::Utc::now().timestamp_millis();
    if left_ms <= 0 {
        // Raced with expiry between the tier read and now
        Some(Duration::from_millis(0))
    } else {
        Some(Duration::from_millis(left_ms as u64))
    }
}

/// Helper for registering the standard data types used by the domain
/// services; hosts can extend the registry before building the store.
pub fn standard_registry() -> Result<CacheRegistry, CacheError> {
    let mut registry = CacheRegistry::new();
    for config in [
        DataTypeConfig::new("market_price", 5, Compression::Json),
        DataTypeConfig::new("market_price_history", 3600, Compression::Gzip)
            .with_max_entries(2_000),
        DataTypeConfig::new("market_kline", 300, Compression::Gzip),
        DataTypeConfig::new("market_depth", 10, Compression::Json),
        DataTypeConfig::new("session", 86_400, Compression::Json),
        DataTypeConfig::new("token_blacklist", 86_400, Compression::None),
        DataTypeConfig::new("ai_context", 7_200, Compression::Json),
        DataTypeConfig::new("ai_history", 0, Compression::Gzip),
        DataTypeConfig::new("ai_response", 1_800, Compression::Gzip),
    ] {
        registry.register(config)?;
    }
    Ok(registry)
}
