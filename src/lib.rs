//! In-process hash map which forgets entries that have not been accessed for a while.
//!
//! `ttlmap` stores key/value pairs in a fixed number of bucket chains. A background *reaper*
//! thread wakes up once per tick, ages every entry and evicts those whose time to live (TTL) has
//! run out. Any successful access (`get`, `contains_key`, `contains_value`, `put`, and the
//! enumerations `key_set`, `values`, `entry_set`) refreshes an entry's TTL.
//!
//! ```
//! use std::time::Duration;
//! use ttlmap::{Config, ExpiringMap};
//!
//! let map: ExpiringMap<String, u32> = Config::new(30)
//!     .interval(Duration::from_millis(100))
//!     .build()
//!     .unwrap();
//! map.put("answer".to_owned(), 42);
//! assert_eq!(map.get("answer"), Some(42));
//! ```
//!
//! # Expiry modes
//!
//! The TTL is always configured in ticks. How a tick decides that an entry is stale depends on
//! [`Expiry`]:
//!
//! * [`Expiry::Elapsed`] (default with a background reaper) records the time of the last access. A tick evicts entries
//!   which have been idle for at least `ttl × interval`. Eviction is therefore driven by
//!   wall-clock time: ticks that fire late or get skipped do not prolong an entry's life, and
//!   an entry is removed by the first tick after its deadline.
//! * [`Expiry::Countdown`] gives each entry a counter of remaining ticks. Each tick decrements it
//!   and the entry is evicted on the tick where it would reach zero. Lifetime is measured in
//!   ticks actually executed, which is exact for manually driven maps but drifts if the reaper
//!   is delayed. This is the default for a [`Schedule::Manual`] map: a TTL of `n` means `n`
//!   calls to [`ExpiringMap::reap`].
//!
//! Expired entries stay visible until the next tick removes them. Lookups do not check expiry
//! on their own.
//!
//! # Concurrency
//!
//! Each bucket chain is protected by its own lock. Callers and the reaper serialize only on the
//! bucket they touch. The bucket count is fixed at construction; there is no rehashing, so
//! skewed key distributions produce longer chains instead of a resize while the reaper walks
//! them.

mod config;
mod entry;
mod metrics;
mod reaper;
mod store;

pub use self::config::{
    Config, Error, Expiry, Result, Schedule, DEFAULT_BUCKETS, DEFAULT_INTERVAL_MS, MAX_TTL,
};
pub use self::metrics::Snapshot;

use self::reaper::Reaper;
use self::store::Store;

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Hash map with idle-time based eviction.
///
/// All operations take `&self`. Share the map between threads with an `Arc`. Dropping the map
/// stops its reaper.
pub struct ExpiringMap<K, V> {
    store: Arc<Store<K, V>>,
    reaper: Option<Reaper>,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Hash + Eq + Send + 'static,
    V: Send + 'static,
{
    /// Creates a map with default parameters and `ttl` ticks of one second each.
    ///
    /// # Errors
    ///
    /// Fails with `Error::NegativeTtl` if `ttl` is negative.
    pub fn new(ttl: i64) -> Result<Self> {
        Config::new(ttl).build()
    }

    pub(crate) fn with_config(cfg: &Config) -> Result<Self> {
        let ttl = cfg.check()?;
        let interval = cfg.schedule.interval();
        let expiry = cfg.effective_expiry();
        let store = Arc::new(Store::new(cfg.buckets, ttl, expiry, interval));
        let reaper = match cfg.schedule {
            Schedule::Every { .. } => Some(Reaper::spawn(Arc::clone(&store), interval)?),
            Schedule::Manual { .. } => None,
        };
        Ok(Self { store, reaper })
    }
}

impl<K, V> ExpiringMap<K, V> {
    /// Number of live entries.
    pub fn size(&self) -> usize {
        self.store.size()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Configured TTL in ticks (after clamping).
    pub fn ttl(&self) -> u32 {
        self.store.ttl()
    }

    pub fn buckets(&self) -> usize {
        self.store.buckets()
    }

    pub fn expiry(&self) -> Expiry {
        self.store.expiry()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.store.clear()
    }

    /// Runs one eviction pass right now and returns the number of evicted entries.
    ///
    /// This is how maps with a [`Schedule::Manual`] schedule age. It may also be called while a
    /// background reaper is running, in which case the extra pass counts as a regular tick.
    pub fn reap(&self) -> usize {
        reaper::tick(&self.store)
    }

    /// Stops the background reaper and waits until it has exited. Entries no longer expire
    /// afterwards unless [`reap`](Self::reap) is called. Does nothing if no reaper is running.
    pub fn stop(&mut self) {
        if let Some(mut r) = self.reaper.take() {
            r.stop();
        }
    }

    /// Returns true while a background reaper is attached.
    pub fn is_reaping(&self) -> bool {
        self.reaper.as_ref().map_or(false, Reaper::is_running)
    }

    pub fn metrics(&self) -> Snapshot {
        self.store.metrics.snapshot()
    }

    /// Copies all values. Every entry counts as accessed.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.store.values()
    }

    /// Copies all key/value pairs. Every entry counts as accessed.
    pub fn entry_set(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.store.entry_set()
    }

    /// Returns true if some entry holds a value equal to `value`.
    ///
    /// This scans the whole map. Only the first matching entry is refreshed. Equality is whatever
    /// `V`'s `PartialEq` says; for pointer-like values (e.g. `Arc<T>`) that compares the pointees,
    /// not the pointers.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.store.contains_value(value)
    }
}

impl<K: Hash + Eq, V> ExpiringMap<K, V> {
    /// Bucket index `key` hashes to.
    pub fn bucket<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.index(key)
    }

    /// Returns a copy of the value stored for `key` and refreshes its TTL.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.store.get(key)
    }

    /// Checks for `key` and refreshes its TTL if present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.contains_key(key)
    }

    /// Inserts `value` for `key` or overwrites the current value. Either way the entry's TTL
    /// starts over. Returns the stored value.
    pub fn put(&self, key: K, value: V) -> V
    where
        V: Clone,
    {
        self.store.put(key, value.clone());
        value
    }

    /// Inserts `value` for `key` like [`put`](Self::put). Returns true if the key was new.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.store.put(key, value)
    }

    /// Inserts all pairs in iteration order. Later pairs overwrite earlier ones with the same
    /// key.
    pub fn put_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in entries {
            self.store.put(k, v);
        }
    }

    /// Removes `key` and returns its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.store.remove(key)
    }

    /// Copies all keys. Every entry counts as accessed.
    pub fn key_set(&self) -> HashSet<K>
    where
        K: Clone,
    {
        self.store.key_set()
    }
}

impl<K, V> fmt::Debug for ExpiringMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringMap")
            .field("size", &self.size())
            .field("buckets", &self.buckets())
            .field("ttl", &self.ttl())
            .field("expiry", &self.expiry())
            .field("reaping", &self.is_reaping())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual(ttl: i64) -> ExpiringMap<&'static str, i32> {
        Config::new(ttl)
            .expiry(Expiry::Countdown)
            .manual()
            .build()
            .unwrap()
    }

    #[test]
    fn new_rejects_negative_ttl() {
        match ExpiringMap::<u32, u32>::new(-5) {
            Err(Error::NegativeTtl(-5)) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn new_starts_reaper() {
        let mut m = ExpiringMap::<u32, u32>::new(10).unwrap();
        assert!(m.is_reaping());
        assert_eq!(m.buckets(), DEFAULT_BUCKETS);
        assert_eq!(m.expiry(), Expiry::Elapsed);
        m.stop();
        assert!(!m.is_reaping());
        m.stop();
    }

    #[test]
    fn put_returns_stored_value() {
        let m = manual(3);
        assert_eq!(m.put("a", 1), 1);
        assert_eq!(m.put("a", 2), 2);
        assert!(!m.insert("a", 3));
        assert!(m.insert("b", 4));
        assert_eq!(m.size(), 2);
    }

    #[test]
    fn empty_map() {
        let m = manual(3);
        assert!(m.is_empty());
        assert_eq!(m.get("x"), None);
        assert_eq!(m.remove("x"), None);
        assert!(!m.contains_key("x"));
        assert!(!m.contains_value(&1));
        assert!(m.key_set().is_empty());
        assert_eq!(m.reap(), 0);
    }

    #[test]
    fn contains_value_refreshes() {
        let m = manual(2);
        m.put("a", 1);
        m.reap();
        assert!(m.contains_value(&1));
        m.reap();
        assert!(m.contains_key("a"));
    }

    #[test]
    fn manual_ttl_counts_reap_calls() {
        let m: ExpiringMap<&str, i32> = Config::new(1).manual().build().unwrap();
        assert_eq!(m.expiry(), Expiry::Countdown);
        m.put("a", 1);
        assert_eq!(m.reap(), 1);
        assert!(m.is_empty());

        let m: ExpiringMap<&str, i32> = Config::new(3).manual().build().unwrap();
        m.put("a", 1);
        assert_eq!(m.reap(), 0);
        assert_eq!(m.reap(), 0);
        assert_eq!(m.reap(), 1);
    }

    #[test]
    fn manual_elapsed_uses_configured_tick() {
        let m: ExpiringMap<&str, i32> = Config::new(1)
            .expiry(Expiry::Elapsed)
            .interval(std::time::Duration::from_millis(10))
            .manual()
            .build()
            .unwrap();
        m.put("a", 1);
        std::thread::sleep(std::time::Duration::from_millis(30));
        assert_eq!(m.reap(), 1);
    }

    #[test]
    fn debug_output() {
        let m = manual(3);
        m.put("a", 1);
        assert_eq!(
            format!("{:?}", m),
            "ExpiringMap { size: 1, buckets: 100, ttl: 3, expiry: Countdown, reaping: false }"
        );
    }
}
