// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Cache configuration and per-data-type policies

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::CacheError;

/// Serialization applied to values before they reach the shared tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Plain JSON bytes, no compression
    None,
    /// JSON bytes (explicit, same wire shape as None)
    Json,
    /// Gzip-compressed JSON bytes
    Gzip,
    /// Compact binary encoding
    Binary,
}

/// Configuration for one registered data type
///
/// Immutable once registered: the registry rejects re-registration under
/// the same name so a data type's TTL and codec cannot drift at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTypeConfig {
    /// Registered name, also the namespace callers pass to cache operations
    pub name: String,

    /// Key partition prefix inside the tiers (defaults to `name`)
    pub namespace: String,

    /// Time-to-live in seconds, 0 means no expiry
    pub ttl_secs: u64,

    /// Codec used for the shared tier
    pub compression: Compression,

    /// Optional bound on local-tier entries for this data type
    pub max_entries: Option<usize>,
}

impl DataTypeConfig {
    pub fn new(name: impl Into<String>, ttl_secs: u64, compression: Compression) -> Self {
        let name = name.into();
        Self {
            namespace: name.clone(),
            name,
            ttl_secs,
            compression,
            max_entries: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.name.is_empty() {
            return Err(CacheError::InvalidConfig(
                "data type name must not be empty".to_string(),
            ));
        }
        if self.namespace.is_empty() || self.namespace.contains(':') {
            return Err(CacheError::InvalidConfig(format!(
                "namespace '{}' must be non-empty and must not contain ':'",
                self.namespace
            )));
        }
        if let Some(0) = self.max_entries {
            return Err(CacheError::InvalidConfig(
                "max_entries must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Registry of data-type configurations
///
/// Populated during facade initialization; lookups after that are
/// read-only, so the map is frozen behind an immutable reference once the
/// store is built.
#[derive(Debug, Default)]
pub struct CacheRegistry {
    configs: HashMap<String, DataTypeConfig>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// Register a data type; rejects duplicates
    pub fn register(&mut self, config: DataTypeConfig) -> Result<(), CacheError> {
        config.validate()?;
        if self.configs.contains_key(&config.name) {
            return Err(CacheError::AlreadyRegistered(config.name));
        }
        self.configs.insert(config.name.clone(), config);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DataTypeConfig> {
        self.configs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

/// Top-level store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path for the durable shared tier; `None` opens a temporary tree
    pub shared_tier_path: Option<std::path::PathBuf>,

    /// Upper bound on local-tier entries across all namespaces
    pub local_max_entries: usize,

    /// Default TTL in seconds for unregistered namespaces
    pub default_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shared_tier_path: None,
            local_max_entries: 10_000,
            default_ttl_secs: 300,
        }
    }
}

impl StoreConfig {
    /// Configuration for memory-constrained deployments
    pub fn memory_constrained() -> Self {
        Self {
            local_max_entries: 2_000,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.local_max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "local_max_entries must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
