//! Correlation store reuniting lane results with waiting callers.
//!
//! Entries are written by lane workers and consumed by at most one
//! waiter. Anything left behind after the wait window is removed by the
//! [`CorrelationReaper`].

mod reaper;

pub use reaper::{CorrelationReaper, ReaperHandle};

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};
use tokio::{
    sync::Notify,
    time::{timeout, Instant},
};

use crate::core::envelope::ResultEnvelope;

static COLLECTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bridge_correlation_collected_total",
        "Results handed back to a waiting caller"
    )
    .unwrap()
});

static REAPED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bridge_correlation_reaped_total",
        "Uncollected results removed by the reaper"
    )
    .unwrap()
});

static DUPLICATES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "bridge_correlation_duplicates_total",
        "Results overwriting an uncollected entry with the same correlation id"
    )
    .unwrap()
});

/// Bounded wait applied by the orchestrator after a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Overall time a caller is willing to wait.
    pub deadline: Duration,
    /// Upper bound between two lookups when no wake-up arrives.
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
struct StoredResult {
    result: ResultEnvelope,
    created_at: Instant,
}

/// Concurrency-safe map from correlation id to result.
#[derive(Debug, Default)]
pub struct CorrelationStore {
    entries: DashMap<String, StoredResult>,
    waiters: DashMap<String, Arc<Notify>>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a worker's result and wake the caller waiting on its id.
    pub fn put(&self, result: ResultEnvelope) {
        let id = result.correlation_id.clone();
        let entry = StoredResult {
            result,
            created_at: Instant::now(),
        };

        if self.entries.insert(id.clone(), entry).is_some() {
            DUPLICATES.inc();
            warn!("Overwrote uncollected result for '{id}', duplicate delivery suspected");
        } else {
            debug!("Stored result for '{id}'");
        }

        if let Some(waiter) = self.waiters.get(&id) {
            // notify_one keeps a permit if the waiter is between lookups
            waiter.notify_one();
        }
    }

    /// Remove and return the result for `id` if it is already there.
    pub fn poll_once(&self, id: &str) -> Option<ResultEnvelope> {
        self.entries.remove(id).map(|(_, stored)| {
            COLLECTED.inc();
            stored.result
        })
    }

    /// Wait until a result for `id` is stored or the deadline elapses.
    ///
    /// A result arriving after the deadline stays in the store until the
    /// reaper removes it.
    pub async fn wait_for(&self, id: &str, policy: WaitPolicy) -> Option<ResultEnvelope> {
        let deadline = Instant::now() + policy.deadline;
        let waiter = WaiterGuard::register(self, id);

        loop {
            if let Some(result) = self.poll_once(id) {
                return Some(result);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Wait deadline elapsed for '{id}'");
                return None;
            }

            let slice = policy.poll_interval.min(deadline - now);
            let _ = timeout(slice, waiter.notify.notified()).await;
        }
    }

    /// Remove entries older than `window`, returning how many were dropped.
    pub fn reap_expired(&self, window: Duration) -> usize {
        let now = Instant::now();
        let mut reaped = 0;
        self.entries.retain(|id, stored| {
            let expired = now.duration_since(stored.created_at) >= window;
            if expired {
                debug!("Reaping uncollected result for '{id}'");
                reaped += 1;
            }
            !expired
        });
        if reaped > 0 {
            REAPED.inc_by(reaped as u64);
        }
        reaped
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

/// Removes the waiter registration when the wait ends or is cancelled.
struct WaiterGuard<'a> {
    store: &'a CorrelationStore,
    id: &'a str,
    notify: Arc<Notify>,
}

impl<'a> WaiterGuard<'a> {
    fn register(store: &'a CorrelationStore, id: &'a str) -> Self {
        let notify = store
            .waiters
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone();
        Self { store, id, notify }
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.store.waiters.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::core::envelope::Intent;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn result(id: &str) -> ResultEnvelope {
        ResultEnvelope::new(id, "hello", Intent::Greeting, 0.95)
    }

    #[test]
    fn test_poll_once_consumes_entry() {
        init_log();
        let store = CorrelationStore::new();
        assert!(store.poll_once("a").is_none());

        store.put(result("a"));
        assert_eq!(store.len(), 1);

        let hit = store.poll_once("a").unwrap();
        assert_eq!(hit.correlation_id, "a");
        assert!(store.poll_once("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_put_overwrites() {
        init_log();
        let store = CorrelationStore::new();
        store.put(result("a"));
        store.put(ResultEnvelope::error("a", "second"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.poll_once("a").unwrap().response, "second");
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_put() {
        init_log();
        let store = Arc::new(CorrelationStore::new());
        let writer = store.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.put(result("late"));
        });

        // poll interval far above the write delay: only the wake-up can deliver in time
        let policy = WaitPolicy {
            deadline: Duration::from_secs(5),
            poll_interval: Duration::from_secs(5),
        };
        let started = std::time::Instant::now();
        let hit = store.wait_for("late", policy).await;
        handle.await.unwrap();

        assert_eq!(hit.unwrap().correlation_id, "late");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(store.is_empty());
        assert_eq!(store.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_returns_stored_result_immediately() {
        let store = CorrelationStore::new();
        store.put(result("ready"));
        let hit = store.wait_for("ready", WaitPolicy::default()).await;
        assert!(hit.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out_and_leaves_late_result() {
        init_log();
        let store = CorrelationStore::new();
        let policy = WaitPolicy {
            deadline: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        };

        assert!(store.wait_for("never", policy).await.is_none());
        assert_eq!(store.waiter_count(), 0);

        // worker finishes after the caller gave up
        store.put(result("never"));
        assert!(store.contains("never"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reap_expired_removes_only_old_entries() {
        init_log();
        let store = CorrelationStore::new();
        store.put(result("old"));
        tokio::time::advance(Duration::from_secs(11)).await;
        store.put(result("fresh"));

        assert_eq!(store.reap_expired(Duration::from_secs(10)), 1);
        assert!(!store.contains("old"));
        assert!(store.contains("fresh"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reaper_and_poller_race_single_consumption() {
        const ENTRIES: usize = 500;
        let store = Arc::new(CorrelationStore::new());
        let written = Arc::new(AtomicBool::new(false));
        let polling_done = Arc::new(AtomicBool::new(false));

        let writer = {
            let (store, written) = (store.clone(), written.clone());
            tokio::spawn(async move {
                for i in 0..ENTRIES {
                    store.put(result(&format!("id-{i}")));
                    if i % 8 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                written.store(true, Ordering::SeqCst);
            })
        };
        let reaper = {
            let (store, polling_done) = (store.clone(), polling_done.clone());
            tokio::spawn(async move {
                let mut reaped = 0;
                while !polling_done.load(Ordering::SeqCst) {
                    reaped += store.reap_expired(Duration::ZERO);
                    tokio::task::yield_now().await;
                }
                reaped
            })
        };
        let poller = {
            let (store, written) = (store.clone(), written.clone());
            tokio::spawn(async move {
                let mut polled = 0;
                for i in 0..ENTRIES {
                    let id = format!("id-{i}");
                    loop {
                        if store.poll_once(&id).is_some() {
                            polled += 1;
                            break;
                        }
                        // written and gone means the reaper took it
                        if written.load(Ordering::SeqCst) && !store.contains(&id) {
                            break;
                        }
                        tokio::task::yield_now().await;
                    }
                }
                polled
            })
        };

        writer.await.unwrap();
        let polled = poller.await.unwrap();
        polling_done.store(true, Ordering::SeqCst);
        let reaped = reaper.await.unwrap() + store.reap_expired(Duration::ZERO);

        assert_eq!(polled + reaped, ENTRIES);
        assert!(store.is_empty());
    }
}
