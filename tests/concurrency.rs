use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use futures::future::join_all;
use snapshot_pool::{BitmapPool, PoolError};

const CAPACITY: usize = 3;

fn record_peak(current: &AtomicUsize, peak: &AtomicUsize) {
    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn tasks_never_exceed_capacity() {
    let pool = BitmapPool::new(CAPACITY).unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..32).map(|i| {
        let pool = pool.clone();
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        tokio::spawn(async move {
            for round in 0..10u32 {
                // Mix sizes so both reuse and eviction paths run.
                let side = 4 + (i + round) % 3;
                let mut bitmap = pool.acquire(side, side).await.unwrap();
                record_peak(&current, &peak);
                assert!(bitmap.is_cleared());
                bitmap.fill(&[1, 2, 3, 4]);

                let stats = pool.stats();
                assert!(stats.checked_out <= CAPACITY);
                assert!(stats.checked_out + stats.available <= CAPACITY);

                tokio::task::yield_now().await;
                current.fetch_sub(1, Ordering::SeqCst);
                pool.release(bitmap).unwrap();
            }
        })
    });

    for result in join_all(tasks).await {
        result.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    let stats = pool.stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.waiters, 0);
    assert_eq!(stats.available_permits, CAPACITY);
    assert_eq!(stats.allocations + stats.reuses, 320);
}

#[test]
fn threads_never_exceed_capacity() {
    let pool = BitmapPool::new(CAPACITY).unwrap();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            thread::spawn(move || {
                for _ in 0..25 {
                    let mut bitmap = pool.acquire_blocking(16, 16).unwrap();
                    record_peak(&current, &peak);
                    assert!(bitmap.is_cleared());
                    bitmap.fill(&[9, 9, 9, 9]);
                    thread::yield_now();
                    current.fetch_sub(1, Ordering::SeqCst);
                    pool.release(bitmap).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    let stats = pool.stats();
    assert_eq!(stats.available_permits, CAPACITY);
    assert!(stats.allocations <= CAPACITY as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocked_task_receives_the_released_bitmap() {
    let pool = BitmapPool::new(1).unwrap();
    let held = pool.acquire(10, 10).await.unwrap();
    let held_id = held.id();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire(10, 10).await.unwrap() })
    };

    while pool.stats().waiters == 0 {
        tokio::task::yield_now().await;
    }
    assert!(!waiter.is_finished());

    pool.release(held).unwrap();
    let handed_over = waiter.await.unwrap();
    assert_eq!(handed_over.id(), held_id);
    assert!(handed_over.is_cleared());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_out_waiters_do_not_leak_permits() {
    let pool = BitmapPool::new(2).unwrap();
    let a = pool.acquire(2, 2).await.unwrap();
    let b = pool.acquire(2, 2).await.unwrap();

    let timeouts = (0..8).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_timeout(2, 2, Duration::from_millis(20)).await })
    });
    for result in join_all(timeouts).await {
        assert!(matches!(result.unwrap(), Err(PoolError::Timeout)));
    }

    pool.release(a).unwrap();
    pool.release(b).unwrap();
    let stats = pool.stats();
    assert_eq!(stats.waiters, 0);
    assert_eq!(stats.available_permits, 2);
    assert_eq!(stats.available, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_bitmap_is_never_held_twice() {
    let pool = BitmapPool::new(2).unwrap();
    let held = Arc::new(Mutex::new(HashSet::new()));

    let tasks = (0..16).map(|_| {
        let pool = pool.clone();
        let held = Arc::clone(&held);
        tokio::spawn(async move {
            for _ in 0..20 {
                let bitmap = pool.acquire(6, 6).await.unwrap();
                assert!(
                    held.lock().unwrap().insert(bitmap.id()),
                    "bitmap {} handed to two holders",
                    bitmap.id()
                );
                tokio::task::yield_now().await;
                held.lock().unwrap().remove(&bitmap.id());
                pool.release(bitmap).unwrap();
            }
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.rejected_releases, 0);
    assert_eq!(stats.available_permits, 2);
    assert!(stats.allocations <= 2);
}
