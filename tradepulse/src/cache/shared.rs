// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Durable shared cache tier
//!
//! The shared tier is behind a trait so deployments can point the store at
//! whatever durable backend they run; the bundled implementation uses sled
//! with one tree per namespace. Records carry their codec and an absolute
//! expiry stamp so any process reading the tier can decode and age them.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::config::Compression;
use super::error::CacheError;

/// One encoded record in the shared tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub payload: Vec<u8>,
    pub compression: Compression,
    /// Epoch milliseconds; `None` means no expiry
    pub expires_at_ms: Option<i64>,
    pub written_at_ms: i64,
}

impl StoredRecord {
    pub fn new(payload: Vec<u8>, compression: Compression, ttl: Option<Duration>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            payload,
            compression,
            expires_at_ms: ttl.map(|d| now + d.as_millis() as i64),
            written_at_ms: now,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }
}

/// Durable tier contract
///
/// Implementations report failures as `CacheError`; the tiered store maps
/// them to misses and error counters, never to caller-visible failures.
#[async_trait]
pub trait SharedTier: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredRecord>, CacheError>;

    async fn put(&self, namespace: &str, key: &str, record: StoredRecord)
        -> Result<(), CacheError>;

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, CacheError>;

    /// Reset the expiry of an existing record
    async fn expire(&self, namespace: &str, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Remove every record in a namespace, returning the count removed
    async fn clear_namespace(&self, namespace: &str) -> Result<usize, CacheError>;

    /// Drop all expired records across namespaces, returning the count
    async fn sweep_expired(&self) -> Result<usize, CacheError>;

    /// Cheap liveness probe used by health checks
    async fn ping(&self) -> Result<(), CacheError>;

    /// Flush outstanding writes; called during shutdown
    async fn flush(&self) -> Result<(), CacheError>;
}

/// Sled-backed shared tier, one tree per namespace
pub struct SledTier {
    db: sled::Db,
    trees: RwLock<HashMap<String, sled::Tree>>,
}

impl SledTier {
    /// Open a durable tier at the given path
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            trees: RwLock::new(HashMap::new()),
        })
    }

    /// Open an ephemeral tier; contents are discarded on drop
    pub fn open_temporary() -> Result<Self, CacheError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            trees: RwLock::new(HashMap::new()),
        })
    }

    fn tree(&self, namespace: &str) -> Result<sled::Tree, CacheError> {
        if let Some(tree) = self.trees.read().get(namespace) {
            return Ok(tree.clone());
        }
        let tree = self.db.open_tree(namespace)?;
        self.trees
            .write()
            .insert(namespace.to_string(), tree.clone());
        Ok(tree)
    }

    fn decode_record(bytes: &[u8]) -> Result<StoredRecord, CacheError> {
        bincode::deserialize(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn encode_record(record: &StoredRecord) -> Result<Vec<u8>, CacheError> {
        bincode::serialize(record).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl SharedTier for SledTier {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<StoredRecord>, CacheError> {
        let tree = self.tree(namespace)?;
        let Some(bytes) = tree.get(key)? else {
            return Ok(None);
        };
        let record = Self::decode_record(&bytes)?;
        if record.is_expired(Utc::now().timestamp_millis()) {
            tree.remove(key)?;
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        record: StoredRecord,
    ) -> Result<(), CacheError> {
        let tree = self.tree(namespace)?;
        let bytes = Self::encode_record(&record)?;
        tree.insert(key, bytes)?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, CacheError> {
        let tree = self.tree(namespace)?;
        Ok(tree.remove(key)?.is_some())
    }

    async fn exists(&self, namespace: &str, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(namespace, key).await?.is_some())
    }

    async fn expire(&self, namespace: &str, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let tree = self.tree(namespace)?;
        let Some(bytes) = tree.get(key)? else {
            return Ok(false);
        };
        let mut record = Self::decode_record(&bytes)?;
        record.expires_at_ms = Some(Utc::now().timestamp_millis() + ttl.as_millis() as i64);
        tree.insert(key, Self::encode_record(&record)?)?;
        Ok(true)
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<usize, CacheError> {
        let tree = self.tree(namespace)?;
        let count = tree.len();
        tree.clear()?;
        Ok(count)
    }

    async fn sweep_expired(&self) -> Result<usize, CacheError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut removed = 0usize;
        let trees: Vec<sled::Tree> = self.trees.read().values().cloned().collect();
        for tree in trees {
            let mut expired_keys = Vec::new();
            for item in tree.iter() {
                let (key, bytes) = item?;
                match Self::decode_record(&bytes) {
                    Ok(record) if record.is_expired(now_ms) => expired_keys.push(key),
                    Ok(_) => {}
                    // Undecodable records are dropped by the sweep as well
                    Err(_) => expired_keys.push(key),
                }
            }
            for key in expired_keys {
                if tree.remove(key)?.is_some() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.db.size_on_disk()?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.db.flush_async().await?;
        Ok(())
    }
}
