//! # Exponential Backoff
//!
//! Per-key exponential backoff used by the work queue when an item is re-added
//! after a failed reconciliation.
//!
//! The delay for a key is `base * 2^failures`, capped at `max`. Each key keeps
//! its own failure counter so one permanently failing Pod never slows down the
//! retries of another.
//!
//! ```rust
//! use arch_scheduling_controller::controller::backoff::ItemExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1));
//! assert_eq!(backoff.next_delay(&"ns/pod"), Duration::from_millis(5));
//! assert_eq!(backoff.next_delay(&"ns/pod"), Duration::from_millis(10));
//! assert_eq!(backoff.next_delay(&"ns/pod"), Duration::from_millis(20));
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Exponential backoff calculator keyed by work item
#[derive(Debug, Clone)]
pub struct ItemExponentialBackoff<K> {
    base: Duration,
    max: Duration,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash + Clone> ItemExponentialBackoff<K> {
    /// Create a backoff that starts at `base` and never exceeds `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Record a failure for `key` and return how long to wait before retrying it
    pub fn next_delay(&mut self, key: &K) -> Duration {
        let failures = self.failures.entry(key.clone()).or_insert(0);
        let exponent = *failures;
        *failures = failures.saturating_add(1);

        2u32.checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Number of failures recorded for `key` since it was last forgotten
    #[must_use]
    pub fn failures(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Drop the failure history of `key` so its next delay starts from `base`
    pub fn forget(&mut self, key: &K) {
        self.failures.remove(key);
    }
}
