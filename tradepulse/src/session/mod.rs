// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Session management: cached sessions, token blacklist, rate limiting

pub mod models;
pub mod rate_limit;
pub mod service;

pub use models::{SessionStatus, UserSession};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimitError, RateLimiter};
pub use service::SessionService;
