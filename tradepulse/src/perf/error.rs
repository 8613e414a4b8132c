// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Monitoring error types

use thiserror::Error;

/// Monitoring and remediation errors
///
/// Never escape their background task: a failed sampling or remediation
/// attempt is logged, recorded in history where applicable, and the task
/// continues on its next tick.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Sampling failed: {0}")]
    Sampling(String),

    #[error("Remediation '{action}' failed: {reason}")]
    Remediation { action: String, reason: String },

    #[error("Unknown optimization type: {0}")]
    UnknownOptimization(String),
}
