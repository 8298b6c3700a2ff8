//! # Work Queue
//!
//! Deduplicating, delayable, rate-limited queue of work keys shared between the
//! change router (producer) and the reconciliation workers (consumers).
//!
//! A key moves through three internal sets:
//!
//! - **dirty**: the key needs processing. Adding a dirty key again is a no-op.
//! - **queue**: dirty keys that are ready to be handed to a worker, in FIFO order.
//! - **processing**: keys currently held by a worker. A key that becomes dirty
//!   while processing is not queued until the worker calls [`WorkQueue::done`],
//!   so two workers never hold the same key at once.
//!
//! Delayed adds (including [`WorkQueue::add_rate_limited`]) are parked in a
//! waiting map keyed by ready time and moved to the queue by a timer task.

use crate::controller::backoff::ItemExponentialBackoff;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Backoff parameters for rate-limited re-adds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Delay applied after the first failure of a key
    pub base_delay: Duration,
    /// Ceiling for the per-key delay
    pub max_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        use crate::constants::{DEFAULT_QUEUE_BASE_DELAY_MS, DEFAULT_QUEUE_MAX_DELAY_SECS};
        Self {
            base_delay: Duration::from_millis(DEFAULT_QUEUE_BASE_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_QUEUE_MAX_DELAY_SECS),
        }
    }
}

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    /// Keys scheduled by `add_after`, with the instant they become ready
    waiting: HashMap<K, Instant>,
    backoff: ItemExponentialBackoff<K>,
    shutting_down: bool,
}

struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
}

/// Cloneable handle to a shared work queue
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> fmt::Debug for WorkQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("WorkQueue")
            .field("queued", &state.queue.len())
            .field("processing", &state.processing.len())
            .field("waiting", &state.waiting.len())
            .field("shutting_down", &state.shutting_down)
            .finish()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    waiting: HashMap::new(),
                    backoff: ItemExponentialBackoff::new(config.base_delay, config.max_delay),
                    shutting_down: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    // Queue invariants hold between statements, so a panic elsewhere never
    // leaves the state half-updated and a poisoned lock is safe to reuse.
    fn state(&self) -> MutexGuard<'_, State<K>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing processing
    ///
    /// No-op if the key is already pending or the queue is shutting down. If a
    /// worker currently holds the key it is re-queued when that worker calls `done`.
    pub fn add(&self, key: K) {
        {
            let mut state = self.state();
            if state.shutting_down || state.dirty.contains(&key) {
                return;
            }
            state.dirty.insert(key.clone());
            if state.processing.contains(&key) {
                return;
            }
            state.queue.push_back(key);
        }
        self.inner.notify.notify_one();
    }

    /// Add `key` once `delay` has elapsed
    ///
    /// If the key is already waiting with an earlier or equal ready time the call
    /// is coalesced into the existing entry.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let ready_at = Instant::now() + delay;
        {
            let mut state = self.state();
            if state.shutting_down {
                return;
            }
            if state
                .waiting
                .get(&key)
                .is_some_and(|existing| *existing <= ready_at)
            {
                return;
            }
            state.waiting.insert(key.clone(), ready_at);
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(ready_at).await;
            let due = {
                let mut state = queue.state();
                // A later add_after with an earlier deadline replaces this entry
                if state.waiting.get(&key) == Some(&ready_at) {
                    state.waiting.remove(&key);
                    true
                } else {
                    false
                }
            };
            if due {
                queue.add(key);
            }
        });
    }

    /// Re-add `key` after its next exponential backoff delay and return that delay
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = self.state().backoff.next_delay(&key);
        self.add_after(key, delay);
        delay
    }

    /// Clear the failure history of `key`
    pub fn forget(&self, key: &K) {
        self.state().backoff.forget(key);
    }

    /// Number of rate-limited re-adds of `key` since it was last forgotten
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().backoff.failures(key)
    }

    /// Wait for the next ready key
    ///
    /// Returns `None` once the queue is shut down and every ready key has been
    /// handed out. The caller must pass the key to [`WorkQueue::done`] when finished.
    pub async fn get(&self) -> Option<K> {
        loop {
            // Enabled before inspecting the state so every add or shutdown after
            // the check wakes a distinct waiter instead of collapsing into one permit.
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Release `key` after processing; re-queues it if it was added meanwhile
    pub fn done(&self, key: &K) {
        {
            let mut state = self.state();
            state.processing.remove(key);
            if !state.dirty.contains(key) {
                return;
            }
            state.queue.push_back(key.clone());
        }
        self.inner.notify.notify_one();
    }

    /// Stop accepting new keys and wake every waiting consumer
    ///
    /// Keys already queued are still handed out by `get`; delayed adds that have
    /// not fired yet are dropped.
    pub fn shutdown(&self) {
        {
            let mut state = self.state();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    /// Number of keys ready to be handed out
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
