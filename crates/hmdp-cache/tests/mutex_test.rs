//! Integration tests for the mutex strategy and rebuild locks.

mod common;

use common::{fast_options, ShopSource, TestCache};
use hmdp_cache::{CacheClientOptions, KeyValueStore, LockRetryPolicy, CACHE_SHOP_KEY};
use hmdp_core::{HmdpError, Shop};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const TTL: Duration = Duration::from_secs(60);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_reads_load_once() {
    let cache = TestCache::new();
    let source = ShopSource::new().with_shop(5, "Dumpling House");
    source.set_delay(Duration::from_millis(100));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let client = cache.client.clone();
        let loader = source.loader();
        handles.push(tokio::spawn(async move {
            client
                .query_with_mutex(CACHE_SHOP_KEY, 5, loader, TTL)
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let shop = handle.await.unwrap();
        assert_eq!(shop, Some(Shop::new(5, "Dumpling House")));
    }
    assert_eq!(source.loads(), 1);
    assert!(!cache.store.contains_key("lock:cache:shop:5"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_of_missing_id_agree() {
    let cache = TestCache::new();
    let source = ShopSource::new();
    source.set_delay(Duration::from_millis(50));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = cache.client.clone();
        let loader = source.loader();
        handles.push(tokio::spawn(async move {
            client
                .query_with_mutex(CACHE_SHOP_KEY, 77, loader, TTL)
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), None);
    }
    assert_eq!(source.loads(), 1);
    assert_eq!(
        cache.store.get("cache:shop:77").await.unwrap(),
        Some(String::new())
    );
}

#[tokio::test]
async fn test_hit_matches_fresh_load() {
    let cache = TestCache::new();
    let source = ShopSource::new().with_shop(42, "Cafe");

    let fresh = cache
        .client
        .query_with_mutex(CACHE_SHOP_KEY, 42, source.loader(), Duration::from_secs(30))
        .await
        .unwrap();
    source.remove(42);
    let cached = cache
        .client
        .query_with_mutex(CACHE_SHOP_KEY, 42, source.loader(), Duration::from_secs(30))
        .await
        .unwrap();

    assert_eq!(fresh.as_ref().map(|s| s.name.as_str()), Some("Cafe"));
    assert_eq!(fresh, cached);
    assert_eq!(source.loads(), 1);
}

#[tokio::test]
async fn test_gives_up_after_retry_budget() {
    let cache = TestCache::with_options(CacheClientOptions {
        lock_retry: LockRetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(5),
        },
        ..CacheClientOptions::default()
    });
    let source = ShopSource::new().with_shop(9, "Grill");
    assert!(cache.client.lock("lock:cache:shop:9").await.unwrap());

    let err = cache
        .client
        .query_with_mutex(CACHE_SHOP_KEY, 9, source.loader(), TTL)
        .await
        .unwrap_err();

    match err {
        HmdpError::CacheBusy { key, attempts } => {
            assert_eq!(key, "cache:shop:9");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected CacheBusy, got {:?}", other),
    }
    assert_eq!(source.loads(), 0);
}

#[tokio::test]
async fn test_waiter_reads_value_written_by_lock_holder() {
    let cache = TestCache::new();
    let source = ShopSource::new().with_shop(11, "Pizzeria");
    assert!(cache.client.lock("lock:cache:shop:11").await.unwrap());

    let client = cache.client.clone();
    let loader = source.loader();
    let waiter = tokio::spawn(async move {
        client
            .query_with_mutex(CACHE_SHOP_KEY, 11, loader, TTL)
            .await
            .unwrap()
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    cache
        .client
        .set("cache:shop:11", &Shop::new(11, "Pizzeria"), TTL)
        .await
        .unwrap();
    cache.client.unlock("lock:cache:shop:11").await.unwrap();

    assert_eq!(waiter.await.unwrap().map(|s| s.name), Some("Pizzeria".to_string()));
    assert_eq!(source.loads(), 0);
}

#[tokio::test]
async fn test_lock_released_after_loader_failure() {
    let cache = TestCache::new();
    let source = ShopSource::new().with_shop(4, "Diner");
    source.set_failing(true);

    let err = assert_err!(
        cache
            .client
            .query_with_mutex(CACHE_SHOP_KEY, 4, source.loader(), TTL)
            .await
    );
    assert!(matches!(err, HmdpError::Database(_)));
    assert!(!cache.store.contains_key("lock:cache:shop:4"));

    source.set_failing(false);
    let shop = assert_ok!(
        cache
            .client
            .query_with_mutex(CACHE_SHOP_KEY, 4, source.loader(), TTL)
            .await
    );
    assert_eq!(shop.map(|s| s.name), Some("Diner".to_string()));
}

#[tokio::test]
async fn test_corrupt_entry_is_rebuilt() {
    let cache = TestCache::new();
    let source = ShopSource::new().with_shop(8, "Deli");
    cache.store.set("cache:shop:8", "[1,2", None).await.unwrap();

    let shop = cache
        .client
        .query_with_mutex(CACHE_SHOP_KEY, 8, source.loader(), TTL)
        .await
        .unwrap();

    assert_eq!(shop.map(|s| s.name), Some("Deli".to_string()));
    assert_eq!(source.loads(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_admits_exactly_one_holder() {
    let cache = TestCache::new();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let client = cache.client.clone();
        handles.push(tokio::spawn(async move {
            client.lock("lock:cache:shop:1").await.unwrap()
        }));
    }

    let mut acquired = 0;
    for handle in handles {
        if handle.await.unwrap() {
            acquired += 1;
        }
    }
    assert_eq!(acquired, 1);

    let ttl = cache.store.ttl("lock:cache:shop:1").unwrap();
    assert!(ttl <= fast_options().lock_ttl);
}

#[tokio::test]
async fn test_namespaces_use_separate_locks() {
    let cache = TestCache::new();
    assert!(cache.client.lock("lock:cache:shop:1").await.unwrap());

    let value = cache
        .client
        .query_with_mutex(
            "cache:user:",
            1,
            |_| async { Ok::<_, HmdpError>(Some("alice".to_string())) },
            TTL,
        )
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("alice"));
}
