use ahash::AHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use crate::telemetry::Metrics;

/// Counter keys shared with whatever reads the statistics
pub mod keys {
    pub const SERVER_CREATED: &str = "server-created";
    pub const SESSION_ACCEPTED: &str = "session-accepted";
    pub const CONTEXT_CREATED: &str = "context-created";
    pub const CONTEXT_RELEASED: &str = "context-released";
    pub const HANDSHAKE_COMPLETED: &str = "handshake-completed";
    pub const HANDSHAKE_FAILED: &str = "handshake-failed";
    pub const HANDSHAKE_TIMEOUT: &str = "handshake-timeout";
    pub const PLAIN_SERVER_CREATED: &str = "plain-server-created";
    pub const PLAIN_SESSION_ACCEPTED: &str = "plain-session-accepted";
}

static GLOBAL_STATS: OnceLock<Arc<Stats>> = OnceLock::new();

/// Named monotonic counters
///
/// Increments are lock-free once a key exists; the map itself is only write-locked
/// the first time a key is seen.
#[derive(Default)]
pub struct Stats {
    counters: RwLock<AHashMap<&'static str, AtomicU64>>,
    metrics: Option<Arc<Metrics>>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters that are also exported through OpenTelemetry
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self { counters: RwLock::default(), metrics: Some(metrics) }
    }

    /// Process-wide sink used when a server is built without an explicit one
    pub fn global() -> Arc<Stats> {
        Arc::clone(GLOBAL_STATS.get_or_init(|| Arc::new(Stats::new())))
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    pub fn inc(&self, key: &'static str) {
        self.add(key, 1);
    }

    pub fn add(&self, key: &'static str, value: u64) {
        if let Some(ref m) = self.metrics {
            m.record_stat(key, value);
        }

        {
            let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
            if let Some(counter) = counters.get(key) {
                counter.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }

        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        counters
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self, key: &str) -> u64 {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        counters
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Current value of every counter, sorted by key
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        let counters = self.counters.read().unwrap_or_else(|e| e.into_inner());
        let mut values: Vec<_> = counters
            .iter()
            .map(|(k, v)| (*k, v.load(Ordering::Relaxed)))
            .collect();
        values.sort_unstable_by_key(|(k, _)| *k);
        values
    }
}

impl std::fmt::Debug for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn unknown_key_reads_zero() {
        let stats = Stats::new();
        assert_eq!(stats.get(keys::SERVER_CREATED), 0);
        assert!(stats.snapshot().is_empty());
    }

    #[test]
    fn inc_and_add_accumulate() {
        let stats = Stats::new();
        stats.inc(keys::SESSION_ACCEPTED);
        stats.inc(keys::SESSION_ACCEPTED);
        stats.add(keys::SESSION_ACCEPTED, 3);
        stats.inc(keys::SERVER_CREATED);

        assert_eq!(stats.get(keys::SESSION_ACCEPTED), 5);
        assert_eq!(
            stats.snapshot(),
            vec![(keys::SERVER_CREATED, 1), (keys::SESSION_ACCEPTED, 5)]
        );
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let stats = Arc::new(Stats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.inc(keys::SESSION_ACCEPTED);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap_or_else(|_| panic!("counter thread panicked"));
        }

        assert_eq!(stats.get(keys::SESSION_ACCEPTED), 8000);
    }

    #[test]
    fn global_is_shared() {
        let a = Stats::global();
        let b = Stats::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
