// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Query fingerprinting
//!
//! Normalizes a query to a literal-free template and hashes it to a
//! fixed-length id, so textually different executions of the same shape
//! aggregate under one fingerprint. Distinct shapes only collide by hash
//! accident, which the stats layer accepts.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").expect("static pattern"));
static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("static pattern"));
static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("static pattern"));
static NUMBER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("static pattern"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Fingerprint of one query shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFingerprint {
    /// Fixed-length digest of the template
    pub hash: String,
    /// Literal-stripped, whitespace-collapsed template
    pub template: String,
}

/// Normalize a query to its template
pub fn normalize(query: &str) -> String {
    let stripped = LINE_COMMENT.replace_all(query, " ");
    let stripped = BLOCK_COMMENT.replace_all(&stripped, " ");
    let stripped = STRING_LITERAL.replace_all(&stripped, "?");
    let stripped = NUMBER_LITERAL.replace_all(&stripped, "?");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Fingerprint a query: normalize then digest the template
pub fn fingerprint(query: &str) -> QueryFingerprint {
    let template = normalize(query);
    let mut hasher = Sha256::new();
    hasher.update(template.as_bytes());
    let digest = hasher.finalize();
    let mut hash = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hash.push_str(&format!("{:02x}", byte));
    }
    QueryFingerprint { hash, template }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_shape_different_literals_fingerprint_identically() {
        let a = fingerprint("SELECT * FROM trades WHERE user_id = 42 AND symbol = 'BTCUSDT'");
        let b = fingerprint("SELECT * FROM trades WHERE user_id = 7 AND symbol = 'ETHUSDT'");
        assert_eq!(a.hash, b.hash);
        assert_eq!(
            a.template,
            "SELECT * FROM trades WHERE user_id = ? AND symbol = ?"
        );
    }

    #[test]
    fn different_shapes_fingerprint_differently() {
        let a = fingerprint("SELECT id FROM users WHERE id = 1");
        let b = fingerprint("SELECT id FROM users WHERE email = 'x@y.z'");
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn comments_and_whitespace_do_not_change_the_fingerprint() {
        let a = fingerprint("SELECT 1 -- trailing note\nFROM dual");
        let b = fingerprint("SELECT /* hint */   1 FROM dual");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn escaped_quotes_inside_strings_are_consumed() {
        let template = normalize("SELECT * FROM notes WHERE body = 'it''s fine' AND id = 3");
        assert_eq!(template, "SELECT * FROM notes WHERE body = ? AND id = ?");
    }

    #[test]
    fn identifiers_with_digits_survive_normalization() {
        let template = normalize("SELECT col1 FROM t2 WHERE col1 > 100");
        assert_eq!(template, "SELECT col1 FROM t2 WHERE col1 > ?");
    }
}
