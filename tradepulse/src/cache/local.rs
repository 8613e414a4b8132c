// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Process-local cache tier
//!
//! Holds decoded values with per-entry expiry and LRU eviction. All
//! mutation happens synchronously under one lock so composite updates are
//! never observed half-applied by other tasks on the loop.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// One local-tier entry
#[derive(Debug, Clone)]
struct LocalEntry {
    value: Value,
    namespace: String,
    expires_at: Option<Instant>,
    last_accessed: Instant,
    access_count: u32,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// LRU order tracker over full cache keys
#[derive(Debug, Default)]
struct LruOrder {
    order: VecDeque<String>,
}

impl LruOrder {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_front(key.to_string());
    }

    fn remove(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    fn pop_lru(&mut self) -> Option<String> {
        self.order.pop_back()
    }
}

#[derive(Debug, Default)]
struct LocalTierInner {
    entries: HashMap<String, LocalEntry>,
    lru: LruOrder,
    namespace_counts: HashMap<String, usize>,
}

impl LocalTierInner {
    fn remove_entry(&mut self, key: &str) -> Option<LocalEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        if let Some(count) = self.namespace_counts.get_mut(&entry.namespace) {
            *count = count.saturating_sub(1);
        }
        Some(entry)
    }
}

/// Fast local tier shared by all data types
#[derive(Debug)]
pub struct LocalTier {
    inner: Mutex<LocalTierInner>,
    max_entries: usize,
}

impl LocalTier {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(LocalTierInner::default()),
            max_entries,
        }
    }

    fn full_key(namespace: &str, key: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    /// Get a value; expired entries are dropped and reported as a miss
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let full = Self::full_key(namespace, key);
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if inner.entries.get(&full).is_some_and(|e| e.is_expired(now)) {
            inner.remove_entry(&full);
            return None;
        }

        let entry = inner.entries.get_mut(&full)?;
        entry.last_accessed = now;
        entry.access_count += 1;
        let value = entry.value.clone();
        inner.lru.touch(&full);
        Some(value)
    }

    /// Insert or overwrite; last writer wins
    pub fn set(
        &self,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
        namespace_cap: Option<usize>,
    ) {
        let full = Self::full_key(namespace, key);
        let now = Instant::now();
        let mut inner = self.inner.lock();

        // Global bound first, then the per-namespace bound
        if !inner.entries.contains_key(&full) {
            while inner.entries.len() >= self.max_entries {
                match inner.lru.pop_lru() {
                    Some(victim) => {
                        inner.remove_entry(&victim);
                    }
                    None => break,
                }
            }
            if let Some(cap) = namespace_cap {
                while inner.namespace_counts.get(namespace).copied().unwrap_or(0) >= cap {
                    let victim = inner
                        .lru
                        .order
                        .iter()
                        .rev()
                        .find(|k| k.starts_with(&format!("{}:", namespace)))
                        .cloned();
                    match victim {
                        Some(victim) => {
                            inner.remove_entry(&victim);
                        }
                        None => break,
                    }
                }
            }
        }

        let replaced = inner
            .entries
            .insert(
                full.clone(),
                LocalEntry {
                    value,
                    namespace: namespace.to_string(),
                    expires_at: ttl.map(|d| now + d),
                    last_accessed: now,
                    access_count: 0,
                },
            )
            .is_some();
        if !replaced {
            *inner
                .namespace_counts
                .entry(namespace.to_string())
                .or_insert(0) += 1;
        }
        inner.lru.touch(&full);
    }

    pub fn delete(&self, namespace: &str, key: &str) -> bool {
        let full = Self::full_key(namespace, key);
        self.inner.lock().remove_entry(&full).is_some()
    }

    pub fn exists(&self, namespace: &str, key: &str) -> bool {
        let full = Self::full_key(namespace, key);
        let now = Instant::now();
        let mut inner = self.inner.lock();
        match inner.entries.get(&full) {
            Some(entry) if entry.is_expired(now) => {
                inner.remove_entry(&full);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Reset the expiry of an existing entry
    pub fn expire(&self, namespace: &str, key: &str, ttl: Duration) -> bool {
        let full = Self::full_key(namespace, key);
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(&full) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    /// Remove every entry in a namespace, returning the count removed
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let prefix = format!("{}:", namespace);
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .entries
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &keys {
            inner.remove_entry(key);
        }
        keys.len()
    }

    /// Drop all expired entries, returning the count removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.remove_entry(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Utilization of the global entry bound, 0.0 to 1.0
    pub fn utilization(&self) -> f64 {
        self.len() as f64 / self.max_entries as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lru_evicts_oldest_when_full() {
        let tier = LocalTier::new(2);
        tier.set("ns", "a", json!(1), None, None);
        tier.set("ns", "b", json!(2), None, None);
        tier.get("ns", "a");
        tier.set("ns", "c", json!(3), None, None);

        assert!(tier.get("ns", "a").is_some());
        assert!(tier.get("ns", "b").is_none());
        assert!(tier.get("ns", "c").is_some());
    }

    #[test]
    fn namespace_cap_only_evicts_within_namespace() {
        let tier = LocalTier::new(100);
        tier.set("quotes", "a", json!(1), None, Some(1));
        tier.set("sessions", "s1", json!("x"), None, None);
        tier.set("quotes", "b", json!(2), None, Some(1));

        assert!(tier.get("quotes", "a").is_none());
        assert!(tier.get("quotes", "b").is_some());
        assert!(tier.get("sessions", "s1").is_some());
    }

    #[test]
    fn expired_entries_read_as_misses_and_sweep_counts_them() {
        let tier = LocalTier::new(10);
        tier.set("ns", "k", json!(1), Some(Duration::from_millis(10)), None);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(tier.sweep_expired(), 1);
        assert!(tier.get("ns", "k").is_none());
    }
}
