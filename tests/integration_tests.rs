//! Integration tests exercising the components together: the rate limiter
//! over its backing cache, the batch processor over the shared semaphore,
//! and the cleanup timer lifecycle end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulkhead::{
    BatchConfig, BatchProcessor, BoundedCache, CacheConfig, ItemOutcome, ManualClock,
    RateLimitRecord, RateLimiter, RateLimiterConfig, Semaphore,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn limiter_with_cache(
    limit: u32,
    window: Duration,
    max_keys: usize,
) -> (RateLimiter<String>, ManualClock) {
    let clock = ManualClock::new();
    let cache: BoundedCache<String, RateLimitRecord> =
        BoundedCache::with_clock(CacheConfig::new(max_keys), Arc::new(clock.clone())).unwrap();
    let limiter = RateLimiter::new(RateLimiterConfig::new(window, limit), cache).unwrap();
    (limiter, clock)
}

// == Rate Limiter over Bounded Cache ==

#[tokio::test]
async fn limiter_full_window_cycle() {
    init_tracing();
    let (limiter, clock) = limiter_with_cache(3, Duration::from_secs(10), 100);
    let key = "client".to_string();

    for _ in 0..3 {
        assert!(limiter.check(&key).await.allowed);
    }

    let denied = limiter.check(&key).await;
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after, Some(Duration::from_secs(10)));

    // Partway through the window the remainder shrinks accordingly
    clock.advance(Duration::from_secs(7));
    let denied = limiter.check(&key).await;
    assert_eq!(denied.retry_after, Some(Duration::from_secs(3)));

    clock.advance(Duration::from_secs(3));
    assert!(limiter.check(&key).await.allowed);
}

#[tokio::test]
async fn limiter_block_overrides_remaining_quota() {
    init_tracing();
    let (limiter, clock) = limiter_with_cache(100, Duration::from_secs(60), 100);
    let key = "abuser".to_string();

    assert!(limiter.check(&key).await.allowed);
    limiter.block(&key, Duration::from_secs(120)).await;

    assert!(limiter.is_blocked(&key).await);
    let denied = limiter.check(&key).await;
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after, Some(Duration::from_secs(120)));

    clock.advance(Duration::from_secs(120));
    assert!(!limiter.is_blocked(&key).await);
    assert!(limiter.check(&key).await.allowed);
}

#[tokio::test]
async fn limiter_state_stays_within_cache_bound() {
    init_tracing();
    let (limiter, _clock) = limiter_with_cache(5, Duration::from_secs(60), 1000);

    for i in 0..2000 {
        assert!(limiter.check(&format!("key-{i}")).await.allowed);
    }

    // Older keys were evicted to honor the bound
    assert!(limiter.tracked_keys().await <= 1000);
}

#[tokio::test]
async fn limiter_evicted_key_starts_fresh_window() {
    init_tracing();
    let (limiter, _clock) = limiter_with_cache(1, Duration::from_secs(3600), 2);
    let key = "first".to_string();

    assert!(limiter.check(&key).await.allowed);
    assert!(!limiter.check(&key).await.allowed);

    // Two newer keys push "first" out of the bounded cache
    limiter.check(&"second".to_string()).await;
    limiter.check(&"third".to_string()).await;

    // Its record is gone, so counting starts over
    assert!(limiter.check(&key).await.allowed);
}

// == Cleanup Timer Lifecycle ==

#[tokio::test]
async fn limiter_cleanup_sweeps_stale_records() {
    init_tracing();
    let clock = ManualClock::new();
    let config = CacheConfig::new(100).with_default_ttl(Duration::from_secs(60));
    let cache: BoundedCache<String, RateLimitRecord> =
        BoundedCache::with_clock(config, Arc::new(clock.clone())).unwrap();
    let limiter =
        RateLimiter::new(RateLimiterConfig::new(Duration::from_secs(10), 5), cache).unwrap();

    for i in 0..10 {
        limiter.check(&format!("key-{i}")).await;
    }
    assert_eq!(limiter.tracked_keys().await, 10);

    let handle = limiter.start_periodic_cleanup(Duration::from_millis(10));
    clock.advance(Duration::from_secs(120));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(limiter.tracked_keys().await, 0);

    handle.stop();
    assert!(!handle.is_running());
    // Stopping again is a no-op
    handle.stop();
    limiter.stop_periodic_cleanup();
}

// == Batch Processing over the Semaphore ==

#[tokio::test]
async fn batch_respects_concurrency_and_settles_every_item() {
    init_tracing();
    let config = BatchConfig {
        concurrency: 3,
        per_item_timeout: Some(Duration::from_secs(5)),
        max_retries: 2,
        backoff_base: Duration::from_millis(1),
        jitter: false,
    };
    let processor = BatchProcessor::new(config).unwrap();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));

    let (w_in_flight, w_peak, w_attempts) =
        (Arc::clone(&in_flight), Arc::clone(&peak), Arc::clone(&attempts));
    let report = processor
        .process((0..10u32).collect(), move |item, _index| {
            let in_flight = Arc::clone(&w_in_flight);
            let peak = Arc::clone(&w_peak);
            let attempts = Arc::clone(&w_attempts);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);

                // Every third item fails on its first attempt only
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if item % 3 == 0 && n < 10 {
                    Err(format!("transient failure on item {item}"))
                } else {
                    Ok(item * 2)
                }
            }
        })
        .await;

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(report.items.len(), 10);
    assert_eq!(report.progress.processed, 10);
    assert_eq!(report.progress.succeeded + report.progress.failed, 10);

    // ETA math never degenerates
    if let Some(eta) = report.progress.eta_seconds {
        assert!(eta.is_finite());
        assert!(eta >= 0.0);
    }
}

#[tokio::test]
async fn batch_exhausted_retries_reports_last_error() {
    init_tracing();
    let config = BatchConfig {
        concurrency: 2,
        per_item_timeout: None,
        max_retries: 2,
        backoff_base: Duration::from_millis(1),
        jitter: false,
    };
    let processor = BatchProcessor::new(config).unwrap();

    let report = processor
        .process(vec!["only".to_string()], |item, _index| async move {
            Err::<(), String>(format!("{item} always fails"))
        })
        .await;

    let item = &report.items[0];
    // Initial attempt plus two retries
    assert_eq!(item.attempts.len(), 3);
    assert!(matches!(
        item.outcome,
        ItemOutcome::Failed { last_error: Some(ref e) } if e == "only always fails"
    ));
    assert_eq!(report.progress.failed, 1);
}

#[tokio::test]
async fn batch_cancellation_settles_all_items() {
    init_tracing();
    let config = BatchConfig {
        concurrency: 2,
        per_item_timeout: None,
        max_retries: 0,
        backoff_base: Duration::from_millis(1),
        jitter: false,
    };
    let processor = BatchProcessor::new(config).unwrap();

    let job = processor.spawn((0..40u32).collect(), |_item, _index| async move {
        tokio::time::sleep(Duration::from_millis(15)).await;
        Ok::<(), String>(())
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    job.cancel();
    let report = job.wait().await;

    assert_eq!(report.progress.processed, 40);
    assert!(report.progress.cancelled > 0);
    assert!(report.progress.succeeded > 0);

    // In-flight items finished normally, the rest never ran a worker
    for item in &report.items {
        match &item.outcome {
            ItemOutcome::Cancelled => assert!(item.attempts.is_empty()),
            ItemOutcome::Succeeded(_) => assert_eq!(item.attempts.len(), 1),
            ItemOutcome::Failed { .. } => panic!("no item should fail in this run"),
        }
    }
}

#[tokio::test]
async fn shared_semaphore_bounds_mixed_workloads() {
    init_tracing();
    let sem = Arc::new(Semaphore::new(2).unwrap());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let sem = Arc::clone(&sem);
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let _permit = sem.clone().acquire_owned().await.unwrap();
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(sem.holders(), 0);
}
