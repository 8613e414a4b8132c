// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Field validation rule tables
//!
//! Rules are a tagged-variant table keyed by field name; one interpreter
//! walks the table against a JSON object. Services build their tables once
//! at construction and reuse them for every call.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Expected shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Object,
}

/// One constraint on a field value
#[derive(Debug, Clone)]
pub enum Constraint {
    MinLen(usize),
    MaxLen(usize),
    Min(f64),
    Max(f64),
    Matches(&'static Lazy<Regex>),
    OneOf(&'static [&'static str]),
}

/// Rule for one field
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub kind: FieldKind,
    pub required: bool,
    pub constraints: Vec<Constraint>,
}

impl FieldRule {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            constraints: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn constrain(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// Table of rules keyed by field name
pub type RuleTable = HashMap<&'static str, FieldRule>;

/// Validate a JSON object against a rule table
///
/// Unknown fields pass through untouched; only fields with rules are
/// checked. Returns every violation rather than stopping at the first.
pub fn validate_fields(rules: &RuleTable, fields: &Map<String, Value>) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();

    for (name, rule) in rules {
        let value = match fields.get(*name) {
            Some(Value::Null) | None => {
                if rule.required {
                    violations.push(format!("field '{}' is required", name));
                }
                continue;
            }
            Some(value) => value,
        };

        if !kind_matches(rule.kind, value) {
            violations.push(format!(
                "field '{}' has wrong type, expected {:?}",
                name, rule.kind
            ));
            continue;
        }

        for constraint in &rule.constraints {
            if let Some(violation) = check_constraint(name, constraint, value) {
                violations.push(violation);
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn kind_matches(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Float => value.is_number(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::Object => value.is_object(),
    }
}

fn check_constraint(name: &str, constraint: &Constraint, value: &Value) -> Option<String> {
    match constraint {
        Constraint::MinLen(min) => {
            let len = value.as_str().map(|s| s.chars().count())?;
            (len < *min).then(|| format!("field '{}' shorter than {} characters", name, min))
        }
        Constraint::MaxLen(max) => {
            let len = value.as_str().map(|s| s.chars().count())?;
            (len > *max).then(|| format!("field '{}' longer than {} characters", name, max))
        }
        Constraint::Min(min) => {
            let num = value.as_f64()?;
            (num < *min).then(|| format!("field '{}' below minimum {}", name, min))
        }
        Constraint::Max(max) => {
            let num = value.as_f64()?;
            (num > *max).then(|| format!("field '{}' above maximum {}", name, max))
        }
        Constraint::Matches(pattern) => {
            let text = value.as_str()?;
            (!pattern.is_match(text)).then(|| format!("field '{}' has invalid format", name))
        }
        Constraint::OneOf(allowed) => {
            let text = value.as_str()?;
            (!allowed.contains(&text)).then(|| {
                format!("field '{}' must be one of: {}", name, allowed.join(", "))
            })
        }
    }
}
