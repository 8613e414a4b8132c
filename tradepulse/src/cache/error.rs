// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Cache error types

use thiserror::Error;

/// Cache subsystem errors
///
/// Callers of the tiered store never see these for ordinary read/write
/// traffic (those paths degrade to misses); they surface only from
/// initialization and from the shared-tier trait implementations.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Shared tier unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("Data type already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl From<sled::Error> for CacheError {
    fn from(error: sled::Error) -> Self {
        CacheError::BackendUnavailable(error.to_string())
    }
}
