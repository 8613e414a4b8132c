// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Rolling query statistics and the slow-query ring

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::fingerprint::fingerprint;

/// Rolling statistics for one query fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryStats {
    pub query_hash: String,
    pub template: String,
    pub execution_count: u64,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub min_time_ms: f64,
    pub max_time_ms: f64,
    pub last_executed: DateTime<Utc>,
}

/// One slow execution kept in the bounded ring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQueryRecord {
    pub query: String,
    pub duration_ms: f64,
    pub parameters: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Tracks per-fingerprint stats plus the slow-query ring
#[derive(Debug)]
pub struct QueryTracker {
    slow_threshold: Duration,
    slow_capacity: usize,
    stats: Mutex<HashMap<String, QueryStats>>,
    slow: Mutex<VecDeque<SlowQueryRecord>>,
}

impl QueryTracker {
    pub fn new(slow_threshold: Duration, slow_capacity: usize) -> Self {
        Self {
            slow_threshold,
            slow_capacity,
            stats: Mutex::new(HashMap::new()),
            slow: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one execution; slow ones also land in the ring
    pub fn record(&self, query: &str, duration: Duration, parameters: Option<Value>) {
        let print = fingerprint(query);
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let now = Utc::now();

        {
            let mut stats = self.stats.lock();
            let entry = stats
                .entry(print.hash.clone())
                .or_insert_with(|| QueryStats {
                    query_hash: print.hash.clone(),
                    template: print.template.clone(),
                    execution_count: 0,
                    total_time_ms: 0.0,
                    avg_time_ms: 0.0,
                    min_time_ms: f64::MAX,
                    max_time_ms: 0.0,
                    last_executed: now,
                });
            entry.execution_count += 1;
            entry.total_time_ms += duration_ms;
            entry.avg_time_ms = entry.total_time_ms / entry.execution_count as f64;
            entry.min_time_ms = entry.min_time_ms.min(duration_ms);
            entry.max_time_ms = entry.max_time_ms.max(duration_ms);
            entry.last_executed = now;
        }

        if duration >= self.slow_threshold {
            let mut slow = self.slow.lock();
            if slow.len() >= self.slow_capacity {
                slow.pop_front();
            }
            slow.push_back(SlowQueryRecord {
                query: query.to_string(),
                duration_ms,
                parameters,
                timestamp: now,
            });
            log::warn!("slow query ({:.1}ms): {}", duration_ms, query);
        }
    }

    pub fn stats_for(&self, query: &str) -> Option<QueryStats> {
        let print = fingerprint(query);
        self.stats.lock().get(&print.hash).cloned()
    }

    /// Slowest templates by average latency
    pub fn top_by_avg_time(&self, limit: usize) -> Vec<QueryStats> {
        let mut all: Vec<QueryStats> = self.stats.lock().values().cloned().collect();
        all.sort_by(|a, b| {
            b.avg_time_ms
                .partial_cmp(&a.avg_time_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        all.truncate(limit);
        all
    }

    /// Most recent slow executions, newest first
    pub fn recent_slow(&self, limit: usize) -> Vec<SlowQueryRecord> {
        self.slow.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Slow executions recorded since `cutoff`
    pub fn slow_count_since(&self, cutoff: DateTime<Utc>) -> usize {
        self.slow
            .lock()
            .iter()
            .filter(|record| record.timestamp >= cutoff)
            .count()
    }

    pub fn distinct_templates(&self) -> usize {
        self.stats.lock().len()
    }

    pub fn total_executions(&self) -> u64 {
        self.stats.lock().values().map(|s| s.execution_count).sum()
    }

    pub fn slow_query_count(&self) -> usize {
        self.slow.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executions_of_the_same_shape_aggregate() {
        let tracker = QueryTracker::new(Duration::from_millis(100), 10);
        tracker.record(
            "SELECT * FROM orders WHERE id = 1",
            Duration::from_millis(10),
            None,
        );
        tracker.record(
            "SELECT * FROM orders WHERE id = 2",
            Duration::from_millis(30),
            None,
        );

        let stats = tracker
            .stats_for("SELECT * FROM orders WHERE id = 99")
            .unwrap();
        assert_eq!(stats.execution_count, 2);
        assert!((stats.avg_time_ms - 20.0).abs() < 1e-9);
        assert!((stats.min_time_ms - 10.0).abs() < 1e-9);
        assert!((stats.max_time_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn slow_ring_evicts_oldest_when_full() {
        let tracker = QueryTracker::new(Duration::from_millis(1), 2);
        for i in 0..3 {
            tracker.record(
                &format!("SELECT {} FROM t", i),
                Duration::from_millis(5),
                None,
            );
        }
        let slow = tracker.recent_slow(10);
        assert_eq!(slow.len(), 2);
        // Newest first; the very first record fell off
        assert!(slow[0].query.contains('2'));
        assert!(slow[1].query.contains('1'));
    }

    #[test]
    fn fast_queries_stay_out_of_the_slow_ring() {
        let tracker = QueryTracker::new(Duration::from_millis(100), 10);
        tracker.record("SELECT 1", Duration::from_millis(5), None);
        assert_eq!(tracker.slow_query_count(), 0);
        assert_eq!(tracker.total_executions(), 1);
    }
}
