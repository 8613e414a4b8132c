// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Index usage analysis
//!
//! Indexes are registered from their DDL, usage is counted as queries
//! touch them, and a full analysis pass scores effectiveness and flags
//! indexes that were never used for removal.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static INDEX_DDL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)CREATE\s+(UNIQUE\s+)?INDEX\s+(?:IF\s+NOT\s+EXISTS\s+)?([A-Za-z_][A-Za-z0-9_]*)\s+ON\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)",
    )
    .expect("static pattern")
});

/// One tracked index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub usage_count: u64,
    /// 0.0-1.0 relative usefulness, set by the analysis pass
    pub effectiveness: f64,
}

/// Result of one full analysis pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexAnalysisReport {
    pub indexes: Vec<IndexInfo>,
    /// Index names with zero recorded usage, candidates for removal
    pub unused: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Index registry and analyzer
#[derive(Debug, Default)]
pub struct IndexAnalyzer {
    indexes: Mutex<HashMap<String, IndexInfo>>,
}

impl IndexAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index from its DDL; returns the index name
    pub fn register_ddl(&self, ddl: &str) -> Option<String> {
        let captures = INDEX_DDL.captures(ddl)?;
        let unique = captures.get(1).is_some();
        let name = captures.get(2)?.as_str().to_string();
        let table = captures.get(3)?.as_str().to_string();
        let columns: Vec<String> = captures
            .get(4)?
            .as_str()
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let mut indexes = self.indexes.lock();
        indexes.entry(name.clone()).or_insert(IndexInfo {
            name: name.clone(),
            table,
            columns,
            unique,
            usage_count: 0,
            effectiveness: 0.0,
        });
        Some(name)
    }

    /// Count one use of an index
    pub fn record_use(&self, name: &str) {
        if let Some(index) = self.indexes.lock().get_mut(name) {
            index.usage_count += 1;
        }
    }

    /// Full analysis pass: score effectiveness, flag unused indexes
    pub fn analyze(&self) -> IndexAnalysisReport {
        let indexes = self.indexes.lock();
        let max_usage = indexes
            .values()
            .map(|i| i.usage_count)
            .max()
            .unwrap_or(0);

        let mut scored: Vec<IndexInfo> = indexes
            .values()
            .map(|index| {
                let mut index = index.clone();
                index.effectiveness = effectiveness(index.usage_count, max_usage);
                index
            })
            .collect();
        scored.sort_by(|a, b| a.name.cmp(&b.name));

        let unused: Vec<String> = scored
            .iter()
            .filter(|i| i.usage_count == 0)
            .map(|i| i.name.clone())
            .collect();

        let mut recommendations = Vec::new();
        for name in &unused {
            recommendations.push(format!(
                "Index '{}' has no recorded usage; consider dropping it.",
                name
            ));
        }
        for index in scored.iter().filter(|i| i.usage_count > 0 && i.effectiveness < 0.2) {
            recommendations.push(format!(
                "Index '{}' is rarely used relative to its peers.",
                index.name
            ));
        }

        IndexAnalysisReport {
            indexes: scored,
            unused,
            recommendations,
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.indexes.lock().len()
    }
}

/// Log-scaled usage relative to the busiest index
fn effectiveness(usage: u64, max_usage: u64) -> f64 {
    if usage == 0 || max_usage == 0 {
        return 0.0;
    }
    let score = ((1 + usage) as f64).ln() / ((1 + max_usage) as f64).ln();
    score.clamp(0.0, 1.0)
}
