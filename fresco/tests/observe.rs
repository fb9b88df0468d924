//! Tests for observing keys through the cache.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fresco::{
    Cache, CacheConfig, CacheEntry, CacheKey, CachePolicy, Clock, EntryStatus, FetchError,
    ManualClock, SharedProducer,
};

fn policy() -> CachePolicy {
    CachePolicy::new(Duration::from_millis(100), Duration::from_millis(1000)).unwrap()
}

fn cache(clock: &ManualClock) -> Cache<String> {
    Cache::with_clock(CacheConfig::default(), clock.shared())
}

fn key() -> CacheKey {
    CacheKey::builder("institutions").part("type", Some("university")).build()
}

/// Producer returning `value` and counting its calls.
fn producer(calls: &Arc<AtomicUsize>, value: &'static str) -> SharedProducer<String> {
    let calls = calls.clone();
    SharedProducer::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, FetchError>(value.to_string()) }
    })
}

/// Producer failing with `error` and counting its calls.
fn failing(calls: &Arc<AtomicUsize>, error: FetchError) -> SharedProducer<String> {
    let calls = calls.clone();
    SharedProducer::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        let error = error.clone();
        async move { Err::<String, _>(error) }
    })
}

fn data(snapshot: &fresco::Snapshot<String>) -> Option<&str> {
    snapshot.data.as_deref().map(String::as_str)
}

#[tokio::test]
async fn test_concurrent_observers_share_one_producer_call() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observations: Vec<_> = (0..5)
        .map(|_| cache.observe(&key(), producer(&calls, "V"), policy()))
        .collect();

    for observation in &observations {
        let snapshot = observation.snapshot();
        assert!(snapshot.is_loading);
        assert_eq!(snapshot.status, EntryStatus::Loading);
        assert!(!snapshot.has_data());
    }

    cache.offload().wait_all().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let first = observations[0].snapshot().data.unwrap();
    for observation in &observations {
        let snapshot = observation.snapshot();
        assert!(Arc::ptr_eq(snapshot.data.as_ref().unwrap(), &first));
        assert!(!snapshot.is_loading);
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.status, EntryStatus::Fresh);
    }
    assert_eq!(cache.store().get(&key()).unwrap().subscriber_count, 5);
}

#[tokio::test]
async fn test_concurrent_observers_share_one_failure() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));
    let error = FetchError::http_status(503, "unavailable");

    let first = cache.observe(&key(), failing(&calls, error.clone()), policy());
    let second = cache.observe(&key(), failing(&calls, error.clone()), policy());
    cache.offload().wait_all().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for observation in [&first, &second] {
        let snapshot = observation.snapshot();
        assert_eq!(snapshot.error.as_ref(), Some(&error));
        assert!(snapshot.data.is_none());
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.status, EntryStatus::Error);
    }
}

#[tokio::test]
async fn test_stale_data_is_served_while_revalidating() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;
    assert_eq!(data(&first.snapshot()), Some("V"));

    clock.advance(Duration::from_millis(150));
    let second = cache.observe(&key(), producer(&calls, "W"), policy());

    let snapshot = second.snapshot();
    assert_eq!(data(&snapshot), Some("V"));
    assert!(snapshot.is_loading);
    assert!(snapshot.is_revalidating());
    assert_eq!(snapshot.status, EntryStatus::Stale);

    // a third observer in the same turn joins the revalidation
    let third = cache.observe(&key(), producer(&calls, "W"), policy());
    assert_eq!(data(&third.snapshot()), Some("V"));

    cache.offload().wait_all().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    for observation in [&first, &second, &third] {
        let snapshot = observation.snapshot();
        assert_eq!(data(&snapshot), Some("W"));
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.status, EntryStatus::Fresh);
    }
}

#[tokio::test]
async fn test_fresh_data_is_not_refetched() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let _first = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;

    clock.advance(Duration::from_millis(99));
    let second = cache.observe(&key(), producer(&calls, "W"), policy());
    let snapshot = second.snapshot();
    assert_eq!(data(&snapshot), Some("V"));
    assert!(!snapshot.is_loading);

    cache.offload().wait_all().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_revalidation_keeps_data() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;

    clock.advance(Duration::from_millis(150));
    let error = FetchError::network("connection reset");
    let _second = cache.observe(&key(), failing(&calls, error.clone()), policy());
    cache.offload().wait_all().await;

    clock.advance(Duration::from_millis(10));
    let snapshot = first.snapshot();
    assert_eq!(data(&snapshot), Some("V"));
    assert_eq!(snapshot.error, Some(error));
    assert!(!snapshot.is_loading);
    assert_eq!(snapshot.status, EntryStatus::Error);
    assert_eq!(cache.snapshot(&key()).error.map(|e| e.kind()), Some("network"));
}

#[tokio::test]
async fn test_success_clears_previous_error() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observation = cache.observe(
        &key(),
        failing(&calls, FetchError::decode("bad json")),
        policy(),
    );
    cache.offload().wait_all().await;
    assert_eq!(observation.snapshot().status, EntryStatus::Error);

    let _retry = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;

    let snapshot = observation.snapshot();
    assert_eq!(data(&snapshot), Some("V"));
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.status, EntryStatus::Fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache.observe(&key(), producer(&calls, "V"), policy());
    let second = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;
    assert_eq!(cache.store().get(&key()).unwrap().subscriber_count, 2);

    assert!(first.unobserve());
    assert!(!first.unobserve());
    assert!(!first.is_active());
    drop(first);
    assert_eq!(cache.store().get(&key()).unwrap().subscriber_count, 1);

    drop(second);
    assert_eq!(cache.store().get(&key()).unwrap().subscriber_count, 0);
}

#[tokio::test]
async fn test_set_then_read_round_trip() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let value = Arc::new("X".to_string());

    let entry = cache.set(&key(), value.clone());
    assert_eq!(entry.status, EntryStatus::Fresh);

    let snapshot = cache.snapshot(&key());
    assert!(Arc::ptr_eq(snapshot.data.as_ref().unwrap(), &value));
    assert!(!snapshot.is_loading);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_set_reaches_observers_immediately() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observation = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;

    cache.set(&key(), "X".to_string());
    assert_eq!(data(&observation.snapshot()), Some("X"));

    // within the stale time, so observing again does not refetch
    let _again = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_changed_streams_every_state() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut observation = cache.observe(&key(), producer(&calls, "V"), policy());
    let mut extra = observation.subscribe();

    let loading = observation.changed().await.unwrap();
    assert!(loading.is_loading);
    assert!(loading.data.is_none());

    let loaded = observation.changed().await.unwrap();
    assert_eq!(data(&loaded), Some("V"));
    assert!(!loaded.is_loading);
    assert!(loaded.version() > loading.version());

    extra.changed().await.unwrap();
    assert_eq!(data(&extra.borrow_and_update()), Some("V"));

    assert!(observation.unobserve());
    assert!(observation.changed().await.is_none());
}

#[tokio::test]
async fn test_invalidate_refetches_observed_key() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observation = cache.observe(&key(), producer(&calls, "V"), policy());
    cache.offload().wait_all().await;

    assert!(cache.invalidate(&key()));
    let snapshot = observation.snapshot();
    assert_eq!(data(&snapshot), Some("V"));
    assert!(snapshot.is_revalidating());
    assert_eq!(snapshot.status, EntryStatus::Stale);

    cache.offload().wait_all().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(observation.snapshot().status, EntryStatus::Fresh);
    assert!(!cache.store().get(&key()).unwrap().invalidated);
}

/// Producer returning `v1`, `v2`, ... after yielding once.
fn versioned(calls: &Arc<AtomicUsize>) -> SharedProducer<String> {
    let calls = calls.clone();
    SharedProducer::new(move || {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            tokio::task::yield_now().await;
            Ok::<_, FetchError>(format!("v{call}"))
        }
    })
}

#[tokio::test]
async fn test_invalidate_during_first_load_refetches_observed_key() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observation = cache.observe(&key(), versioned(&calls), policy());
    assert!(cache.invalidate(&key()));
    assert!(observation.snapshot().is_loading);

    cache.offload().wait_all().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let snapshot = observation.snapshot();
    assert_eq!(snapshot.status, EntryStatus::Fresh);
    assert_eq!(data(&snapshot), Some("v2"));
    assert!(!snapshot.is_loading);
    assert!(!cache.store().get(&key()).unwrap().invalidated);
}

#[tokio::test]
async fn test_invalidate_during_revalidation_refetches_observed_key() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observation = cache.observe(&key(), versioned(&calls), policy());
    cache.offload().wait_all().await;

    clock.advance(Duration::from_millis(150));
    let _second = cache.observe(&key(), versioned(&calls), policy());
    assert!(observation.snapshot().is_revalidating());
    assert!(cache.invalidate(&key()));

    let writes = Arc::new(Mutex::new(Vec::new()));
    let _recorder = {
        let writes = writes.clone();
        cache.store().subscribe(&key(), move |entry: &CacheEntry<String>| {
            let data = entry.data.as_deref().cloned();
            writes.lock().unwrap().push((entry.status, data));
        })
    };
    cache.offload().wait_all().await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let snapshot = observation.snapshot();
    assert_eq!(snapshot.status, EntryStatus::Fresh);
    assert_eq!(data(&snapshot), Some("v3"));

    // the superseded result lands as stale data
    let writes = writes.lock().unwrap();
    assert!(writes.contains(&(EntryStatus::Stale, Some("v2".to_string()))));
    assert_eq!(writes.last(), Some(&(EntryStatus::Fresh, Some("v3".to_string()))));
    assert!(
        writes
            .iter()
            .filter(|(status, _)| *status == EntryStatus::Fresh)
            .all(|(_, data)| data.as_deref() == Some("v3"))
    );
}

#[tokio::test]
async fn test_invalidate_during_unobserved_fetch_leaves_entry_stale() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let started = cache
        .coordinator()
        .ensure_fresh(&key(), &versioned(&calls), &policy(), clock.now());
    assert!(started.is_started());
    assert!(cache.invalidate(&key()));

    assert_eq!(started.into_result().await.unwrap().as_str(), "v1");
    cache.offload().wait_all().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let snapshot = cache.snapshot(&key());
    assert_eq!(snapshot.status, EntryStatus::Stale);
    assert_eq!(data(&snapshot), Some("v1"));

    let observation = cache.observe(&key(), versioned(&calls), policy());
    assert!(observation.snapshot().is_revalidating());
    cache.offload().wait_all().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(observation.snapshot().status, EntryStatus::Fresh);
}

#[tokio::test]
async fn test_invalidate_unobserved_key_refetches_on_next_observation() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    drop(cache.observe(&key(), producer(&calls, "V"), policy()));
    cache.offload().wait_all().await;

    assert!(cache.invalidate(&key()));
    cache.offload().wait_all().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(data(&cache.snapshot(&key())), Some("V"));

    // still younger than the stale time, but invalidated
    let observation = cache.observe(&key(), producer(&calls, "W"), policy());
    assert!(observation.snapshot().is_revalidating());
    cache.offload().wait_all().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(data(&observation.snapshot()), Some("W"));

    assert!(!cache.invalidate(&CacheKey::from_raw("unknown")));
}

#[tokio::test]
async fn test_late_result_is_kept_after_teardown() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observation = cache.observe(&key(), producer(&calls, "V"), policy());
    observation.unobserve();
    cache.offload().wait_all().await;

    let entry = cache.store().get(&key()).unwrap();
    assert_eq!(entry.subscriber_count, 0);
    assert_eq!(entry.data.as_deref().map(String::as_str), Some("V"));
}

#[tokio::test]
async fn test_fetch_without_observing() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let value = cache.fetch(&key(), producer(&calls, "V"), policy()).await.unwrap();
    assert_eq!(value.as_str(), "V");

    let again = cache.fetch(&key(), producer(&calls, "W"), policy()).await.unwrap();
    assert!(Arc::ptr_eq(&value, &again));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let err = cache
        .fetch(
            &CacheKey::from_raw("people"),
            failing(&calls, FetchError::http_status(404, "not found")),
            policy(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_fetch_joins_observation_in_flight() {
    let clock = ManualClock::new();
    let cache = cache(&clock);
    let calls = Arc::new(AtomicUsize::new(0));

    let observation = cache.observe(&key(), producer(&calls, "V"), policy());
    let value = cache.fetch(&key(), producer(&calls, "W"), policy()).await.unwrap();

    assert_eq!(value.as_str(), "V");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(data(&observation.snapshot()), Some("V"));
}
