mod common;

use common::{count, counted_upper, counter};
use flowkit::cache::{CacheStore, MemoryStore};
use flowkit::{Cache, CacheConfig, Context, Flow};
use std::sync::Arc;
use std::time::Duration;

async fn run(flow: &Flow, input: &'static str) -> String {
    let mut out = String::new();
    flow.run(&Context::background(), input, &mut out)
        .await
        .unwrap();
    out
}

#[tokio::test]
async fn test_identical_input_is_computed_once_per_ttl() {
    let calls = counter();
    let flow = Flow::new().use_handler(Cache::new(
        counted_upper(calls.clone()),
        Duration::from_millis(100),
    ));

    assert_eq!(run(&flow, "same").await, "SAME");
    assert_eq!(run(&flow, "same").await, "SAME");
    assert_eq!(count(&calls), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(run(&flow, "same").await, "SAME");
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn test_different_inputs_use_different_entries() {
    let calls = counter();
    let flow = Flow::new().use_handler(Cache::new(counted_upper(calls.clone()), Duration::from_secs(60)));
    assert_eq!(run(&flow, "one").await, "ONE");
    assert_eq!(run(&flow, "two").await, "TWO");
    assert_eq!(run(&flow, "one").await, "ONE");
    assert_eq!(count(&calls), 2);
}

#[tokio::test]
async fn test_store_shared_between_caches() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
    let config = CacheConfig::new().with_ttl(Duration::from_secs(60));
    let first_calls = counter();
    let second_calls = counter();

    let first = Cache::with_store(counted_upper(first_calls.clone()), store.clone(), config.clone());
    let second = Cache::with_store(counted_upper(second_calls.clone()), store.clone(), config);

    assert_eq!(run(&Flow::new().use_handler(first), "x").await, "X");
    assert_eq!(run(&Flow::new().use_handler(second), "x").await, "X");
    assert_eq!((count(&first_calls), count(&second_calls)), (1, 0));
    assert_eq!(store.list().await.unwrap().len(), 1);
}
