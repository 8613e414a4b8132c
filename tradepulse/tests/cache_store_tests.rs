//! Tests for the tiered cache store and facade
//!
//! Covers the round-trip/expiry contract, fallback population, namespace
//! clearing and the fail-soft read path.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use tradepulse::cache::{CacheRegistry, Compression, DataTypeConfig, SledTier, StoreConfig};
use tradepulse::{CacheFacade, CacheStore};

fn test_registry() -> CacheRegistry {
    let mut registry = CacheRegistry::new();
    registry
        .register(DataTypeConfig::new("plain", 0, Compression::Json))
        .unwrap();
    registry
        .register(DataTypeConfig::new("short_lived", 1, Compression::Json))
        .unwrap();
    registry
        .register(DataTypeConfig::new("packed", 0, Compression::Gzip))
        .unwrap();
    registry
}

fn test_store() -> CacheStore {
    let _ = env_logger::builder().is_test(true).try_init();
    let shared = Arc::new(SledTier::open_temporary().unwrap());
    CacheStore::new(&StoreConfig::default(), test_registry(), shared).unwrap()
}

#[tokio::test]
async fn set_then_get_round_trips() {
    let store = test_store();
    let value = json!({"symbol": "BTCUSDT", "price": 61250.5});

    assert!(store.set("plain", "quote", value.clone()).await);
    assert_eq!(store.get("plain", "quote").await, Some(value));
}

#[tokio::test]
async fn entries_expire_after_their_ttl() {
    let store = test_store();
    store.set("short_lived", "k", json!(1)).await;
    assert_eq!(store.get("short_lived", "k").await, Some(json!(1)));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(store.get("short_lived", "k").await, None);
}

#[tokio::test]
async fn cold_local_tier_is_repopulated_from_the_shared_tier() {
    let shared = Arc::new(SledTier::open_temporary().unwrap());
    let writer =
        CacheStore::new(&StoreConfig::default(), test_registry(), shared.clone()).unwrap();
    let reader = CacheStore::new(&StoreConfig::default(), test_registry(), shared).unwrap();

    writer.set("packed", "series", json!([1, 2, 3])).await;

    // The reader's local tier has never seen the key; the value must
    // come back through the shared tier and land locally.
    assert_eq!(reader.get("packed", "series").await, Some(json!([1, 2, 3])));
    assert_eq!(reader.local_entry_count(), 1);
}

#[tokio::test]
async fn fallback_populates_on_full_miss() {
    let store = test_store();

    let value = store
        .get_with("plain", "missing", || async { Some(json!("produced")) })
        .await;
    assert_eq!(value, Some(json!("produced")));

    // Second read must come from the cache, not the producer
    let cached = store
        .get_with("plain", "missing", || async {
            panic!("fallback must not run on a hit")
        })
        .await;
    assert_eq!(cached, Some(json!("produced")));
}

#[tokio::test]
async fn fallback_returning_none_stays_a_miss() {
    let store = test_store();
    let value = store.get_with("plain", "void", || async { None }).await;
    assert_eq!(value, None);
    assert_eq!(store.get("plain", "void").await, None);
}

#[tokio::test]
async fn clear_namespace_reports_the_count_and_spares_others() {
    let store = test_store();
    for i in 0..5 {
        store.set("plain", &format!("k{}", i), json!(i)).await;
    }
    store.set("packed", "other", json!("stays")).await;

    assert_eq!(store.clear_namespace("plain").await, 5);
    assert_eq!(store.get("plain", "k0").await, None);
    assert_eq!(store.get("packed", "other").await, Some(json!("stays")));
}

#[tokio::test]
async fn delete_and_exists_agree() {
    let store = test_store();
    store.set("plain", "k", json!(true)).await;
    assert!(store.exists("plain", "k").await);
    assert!(store.delete("plain", "k").await);
    assert!(!store.exists("plain", "k").await);
    assert!(!store.delete("plain", "k").await);
}

#[tokio::test]
async fn expire_overrides_the_namespace_ttl() {
    let store = test_store();
    store.set("plain", "k", json!(1)).await;
    assert!(store.expire("plain", "k", Duration::from_millis(50)).await);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(store.get("plain", "k").await, None);
}

#[tokio::test]
async fn typed_wrappers_round_trip_structs() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Quote {
        symbol: String,
        bid: f64,
        ask: f64,
    }

    let store = test_store();
    let quote = Quote {
        symbol: "ETHUSDT".to_string(),
        bid: 3010.0,
        ask: 3010.5,
    };
    assert!(store.set_as("plain", "eth", &quote).await);
    let read: Quote = store.get_as("plain", "eth").await.unwrap();
    assert_eq!(read, quote);
}

#[tokio::test]
async fn metrics_count_hits_misses_and_writes() {
    let store = test_store();
    store.set("plain", "k", json!(1)).await;
    store.get("plain", "k").await;
    store.get("plain", "absent").await;

    let snapshot = store.metrics_snapshot();
    let plain = &snapshot["plain"];
    assert_eq!(plain.writes, 1);
    assert_eq!(plain.hits, 1);
    assert_eq!(plain.misses, 1);
    assert!((plain.hit_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn values_survive_a_reopen_through_the_durable_tier() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        shared_tier_path: Some(dir.path().join("cache")),
        ..StoreConfig::default()
    };

    {
        let facade = CacheFacade::init(config.clone()).unwrap();
        facade.set("market_kline", "BTC:1m", json!([1, 2, 3])).await;
        facade.shutdown().await;
    }

    let facade = CacheFacade::init(config).unwrap();
    assert_eq!(
        facade.get("market_kline", "BTC:1m").await,
        Some(json!([1, 2, 3]))
    );
}

#[tokio::test]
async fn facade_health_reports_components() {
    let facade = CacheFacade::init(StoreConfig::default()).unwrap();
    let health = facade.health().await;
    assert_eq!(health.status, tradepulse::HealthStatus::Healthy);
    let names: Vec<&str> = health.components.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"local_tier"));
    assert!(names.contains(&"shared_tier"));
}
