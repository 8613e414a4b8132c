// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Fixed-window rate limiting
//!
//! Three independent windows (minute/hour/day) per `(user, endpoint)`.
//! Every check reads one `now`, resets any window whose reset time has
//! passed, evaluates all three limits, and on allow increments all three
//! counters — all under one lock so the composite update is atomic.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Rate-limit check failures; callers are expected to fail open
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("invalid rate limit key: {0}")]
    InvalidKey(String),
}

/// Per-window request limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1_000,
            per_day: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct WindowCounter {
    count: u32,
    reset_at: DateTime<Utc>,
}

impl WindowCounter {
    fn new(now: DateTime<Utc>, unit: ChronoDuration) -> Self {
        Self {
            count: 0,
            reset_at: now + unit,
        }
    }

    /// Reset to 0 when the window has passed, advancing the reset time by
    /// whole window units until it is in the future.
    fn roll(&mut self, now: DateTime<Utc>, unit: ChronoDuration) {
        while now >= self.reset_at {
            self.count = 0;
            self.reset_at += unit;
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    minute: WindowCounter,
    hour: WindowCounter,
    day: WindowCounter,
}

impl RateLimitWindow {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            minute: WindowCounter::new(now, ChronoDuration::minutes(1)),
            hour: WindowCounter::new(now, ChronoDuration::hours(1)),
            day: WindowCounter::new(now, ChronoDuration::days(1)),
        }
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Window names at or over their limit ("minute", "hour", "day")
    pub limits_exceeded: Vec<String>,
    pub remaining_minute: u32,
    pub remaining_hour: u32,
    pub remaining_day: u32,
    /// Seconds until the earliest exceeded window resets
    pub retry_after_secs: Option<i64>,
}

impl RateLimitDecision {
    fn allowed(minute_left: u32, hour_left: u32, day_left: u32) -> Self {
        Self {
            allowed: true,
            limits_exceeded: Vec::new(),
            remaining_minute: minute_left,
            remaining_hour: hour_left,
            remaining_day: day_left,
            retry_after_secs: None,
        }
    }
}

/// In-process fixed-window rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<(String, String), RateLimitWindow>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and, if allowed, count a request for `(user, endpoint)`
    pub fn check(&self, user_id: &str, endpoint: &str) -> Result<RateLimitDecision, RateLimitError> {
        self.check_at(user_id, endpoint, Utc::now())
    }

    pub fn check_at(
        &self,
        user_id: &str,
        endpoint: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, RateLimitError> {
        if user_id.is_empty() || endpoint.is_empty() {
            return Err(RateLimitError::InvalidKey(format!(
                "user '{}' endpoint '{}'",
                user_id, endpoint
            )));
        }
        let mut windows = self.windows.lock();
        let window = windows
            .entry((user_id.to_string(), endpoint.to_string()))
            .or_insert_with(|| RateLimitWindow::new(now));

        window.minute.roll(now, ChronoDuration::minutes(1));
        window.hour.roll(now, ChronoDuration::hours(1));
        window.day.roll(now, ChronoDuration::days(1));

        let mut exceeded = Vec::new();
        let mut retry_after: Option<i64> = None;
        for (name, counter, limit) in [
            ("minute", &window.minute, self.config.per_minute),
            ("hour", &window.hour, self.config.per_hour),
            ("day", &window.day, self.config.per_day),
        ] {
            if counter.count >= limit {
                exceeded.push(name.to_string());
                let reset_in = (counter.reset_at - now).num_seconds().max(0);
                retry_after = Some(retry_after.map_or(reset_in, |r| r.min(reset_in)));
            }
        }

        if !exceeded.is_empty() {
            return Ok(RateLimitDecision {
                allowed: false,
                limits_exceeded: exceeded,
                remaining_minute: self.config.per_minute.saturating_sub(window.minute.count),
                remaining_hour: self.config.per_hour.saturating_sub(window.hour.count),
                remaining_day: self.config.per_day.saturating_sub(window.day.count),
                retry_after_secs: retry_after,
            });
        }

        window.minute.count += 1;
        window.hour.count += 1;
        window.day.count += 1;

        Ok(RateLimitDecision::allowed(
            self.config.per_minute - window.minute.count,
            self.config.per_hour - window.hour.count,
            self.config.per_day - window.day.count,
        ))
    }

    /// Drop windows idle past their day reset; returns the count removed
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now < w.day.reset_at);
        before - windows.len()
    }

    pub fn tracked_pairs(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_first_call_in_a_minute_is_denied() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let now = Utc::now();

        for _ in 0..60 {
            assert!(limiter.check_at("u1", "/api/quotes", now).unwrap().allowed);
        }
        let decision = limiter.check_at("u1", "/api/quotes", now).unwrap();
        assert!(!decision.allowed);
        assert!(decision.limits_exceeded.contains(&"minute".to_string()));
        assert!(decision.retry_after_secs.is_some());
    }

    #[test]
    fn counter_resets_once_the_window_passes() {
        let limiter = RateLimiter::new(RateLimitConfig {
            per_minute: 2,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();

        assert!(limiter.check_at("u1", "/api/x", now).unwrap().allowed);
        assert!(limiter.check_at("u1", "/api/x", now).unwrap().allowed);
        assert!(!limiter.check_at("u1", "/api/x", now).unwrap().allowed);

        let later = now + ChronoDuration::seconds(61);
        let decision = limiter.check_at("u1", "/api/x", later).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining_minute, 1);
    }

    #[test]
    fn windows_are_independent_per_user_and_endpoint() {
        let limiter = RateLimiter::new(RateLimitConfig {
            per_minute: 1,
            ..RateLimitConfig::default()
        });
        let now = Utc::now();

        assert!(limiter.check_at("u1", "/a", now).unwrap().allowed);
        assert!(limiter.check_at("u1", "/b", now).unwrap().allowed);
        assert!(limiter.check_at("u2", "/a", now).unwrap().allowed);
        assert!(!limiter.check_at("u1", "/a", now).unwrap().allowed);
    }

    #[test]
    fn long_idle_gap_advances_reset_past_now() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let now = Utc::now();
        limiter.check_at("u1", "/a", now).unwrap();

        let much_later = now + ChronoDuration::hours(3);
        let decision = limiter.check_at("u1", "/a", much_later).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining_minute, 59);
    }
}
