// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Market data cache service
//!
//! Typed wrapper over the tiered store for quote, kline and depth data.
//! Real-time prices keep a short-TTL point value plus a rolling history
//! capped at [`PRICE_HISTORY_CAP`] points; kline series and depth
//! snapshots are replaced wholesale on every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::cache::CacheStore;

const NS_PRICE: &str = "market_price";
const NS_PRICE_HISTORY: &str = "market_price_history";
const NS_KLINE: &str = "market_kline";
const NS_DEPTH: &str = "market_depth";

/// Rolling price history bound per symbol; oldest points are trimmed first
pub const PRICE_HISTORY_CAP: usize = 1000;

/// One traded price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// One candlestick bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One side level of an order book snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: f64,
}

/// Full order book snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub symbol: String,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub timestamp: DateTime<Utc>,
}

/// Market data cache service
pub struct MarketCache {
    store: Arc<CacheStore>,
}

impl MarketCache {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Cache a real-time price and append it to the symbol's rolling history
    pub async fn cache_realtime_price(&self, point: &PricePoint) -> bool {
        let stored = self.store.set_as(NS_PRICE, &point.symbol, point).await;

        // Append-only rolling history, FIFO-trimmed at the cap. The
        // read-modify-write spans an await; last-write-wins is accepted
        // for this data.
        let mut history: Vec<PricePoint> = self
            .store
            .get_as(NS_PRICE_HISTORY, &point.symbol)
            .await
            .unwrap_or_default();
        history.push(point.clone());
        if history.len() > PRICE_HISTORY_CAP {
            let excess = history.len() - PRICE_HISTORY_CAP;
            history.drain(..excess);
        }
        self.store
            .set_as(NS_PRICE_HISTORY, &point.symbol, &history)
            .await;

        stored
    }

    pub async fn get_realtime_price(&self, symbol: &str) -> Option<PricePoint> {
        self.store.get_as(NS_PRICE, symbol).await
    }

    /// Most recent history points for a symbol, oldest first
    pub async fn get_price_history(&self, symbol: &str, limit: usize) -> Vec<PricePoint> {
        let history: Vec<PricePoint> = self
            .store
            .get_as(NS_PRICE_HISTORY, symbol)
            .await
            .unwrap_or_default();
        let skip = history.len().saturating_sub(limit);
        history.into_iter().skip(skip).collect()
    }

    /// Replace the stored series for `(symbol, interval)` wholesale
    pub async fn cache_kline_series(&self, symbol: &str, interval: &str, bars: &[Kline]) -> bool {
        let key = kline_key(symbol, interval);
        self.store.set_as(NS_KLINE, &key, &bars).await
    }

    /// Most recent `limit` bars of a stored series, oldest first
    pub async fn get_kline_series(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Vec<Kline> {
        let key = kline_key(symbol, interval);
        let bars: Vec<Kline> = self.store.get_as(NS_KLINE, &key).await.unwrap_or_default();
        let skip = bars.len().saturating_sub(limit);
        bars.into_iter().skip(skip).collect()
    }

    /// Full-overwrite depth snapshot with a short TTL
    pub async fn cache_market_depth(&self, depth: &MarketDepth) -> bool {
        self.store.set_as(NS_DEPTH, &depth.symbol, depth).await
    }

    pub async fn get_market_depth(&self, symbol: &str) -> Option<MarketDepth> {
        self.store.get_as(NS_DEPTH, symbol).await
    }

    /// Drop all cached data for a symbol, e.g. on delisting
    pub async fn purge_symbol(&self, symbol: &str) -> usize {
        let mut removed = 0;
        for ns in [NS_PRICE, NS_PRICE_HISTORY, NS_DEPTH] {
            if self.store.delete(ns, symbol).await {
                removed += 1;
            }
        }
        removed
    }

    /// Lightweight summary for the facade's stats surface
    pub async fn summary(&self, symbol: &str) -> serde_json::Value {
        let price = self.get_realtime_price(symbol).await;
        let history_len = self.get_price_history(symbol, PRICE_HISTORY_CAP).await.len();
        json!({
            "symbol": symbol,
            "last_price": price.as_ref().map(|p| p.price),
            "last_update": price.as_ref().map(|p| p.timestamp),
            "history_points": history_len,
        })
    }
}

fn kline_key(symbol: &str, interval: &str) -> String {
    format!("{}:{}", symbol, interval)
}
