// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Sliding-window trend detection
//!
//! Keeps a bounded window of recent samples per metric and fits a
//! least-squares line through them. Trend detection is independent of
//! threshold classification: a metric can degrade steadily without any
//! single sample breaching its thresholds.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;

/// Minimum samples before a slope is reported
const MIN_SAMPLES: usize = 3;

/// Sliding window of `(time, value)` samples for one metric
#[derive(Debug)]
pub struct TrendTracker {
    window: ChronoDuration,
    samples: VecDeque<(DateTime<Utc>, f64)>,
}

impl TrendTracker {
    pub fn new(window: std::time::Duration) -> Self {
        Self {
            window: ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::minutes(10)),
            samples: VecDeque::new(),
        }
    }

    /// Record a sample and drop anything older than the window
    pub fn record(&mut self, at: DateTime<Utc>, value: f64) {
        self.samples.push_back((at, value));
        let horizon = at - self.window;
        while self
            .samples
            .front()
            .is_some_and(|(t, _)| *t < horizon)
        {
            self.samples.pop_front();
        }
    }

    /// Least-squares slope of the window in value-units per second
    ///
    /// `None` until enough samples have accumulated.
    pub fn slope(&self) -> Option<f64> {
        let n = self.samples.len();
        if n < MIN_SAMPLES {
            return None;
        }

        let t0 = self.samples.front()?.0;
        let points: Vec<(f64, f64)> = self
            .samples
            .iter()
            .map(|(t, v)| (((*t - t0).num_milliseconds() as f64) / 1000.0, *v))
            .collect();

        let count = n as f64;
        let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
        let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
        let sum_xx: f64 = points.iter().map(|(x, _)| x * x).sum();
        let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();

        let denominator = count * sum_xx - sum_x * sum_x;
        if denominator.abs() < f64::EPSILON {
            return None;
        }
        Some((count * sum_xy - sum_x * sum_y) / denominator)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
