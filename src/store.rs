//! Fixed-size array of independently locked bucket chains.

use crate::config::Expiry;
use crate::entry::{Chain, Entry};
use crate::metrics::Metrics;

use fnv::FnvHasher;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Shared state of an `ExpiringMap`, used both by callers and by the reaper thread.
///
/// Every chain sits behind its own lock so that operations on unrelated buckets never contend.
/// `count` is only modified while the lock of the affected chain is held, thus it always equals
/// the sum of all chain lengths once concurrent operations have finished.
#[derive(Debug)]
pub struct Store<K, V> {
    chains: Box<[Mutex<Chain<K, V>>]>,
    count: AtomicUsize,
    ttl: u32,
    expiry: Expiry,
    /// Idle time after which an entry expires (elapsed-time expiry)
    idle: Duration,
    pub metrics: Metrics,
}

impl<K, V> Store<K, V> {
    pub fn new(buckets: usize, ttl: u32, expiry: Expiry, interval: Duration) -> Self {
        Self {
            chains: (0..buckets).map(|_| Mutex::new(Chain::default())).collect(),
            count: AtomicUsize::new(0),
            ttl,
            expiry,
            idle: interval.checked_mul(ttl).unwrap_or(Duration::MAX),
            metrics: Metrics::default(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[inline]
    pub fn buckets(&self) -> usize {
        self.chains.len()
    }

    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    #[inline]
    pub fn expiry(&self) -> Expiry {
        self.expiry
    }

    pub fn clear(&self) {
        for chain in self.chains.iter() {
            let detached = {
                let mut chain = chain.lock();
                let detached = chain.take();
                self.count.fetch_sub(detached.len(), Ordering::SeqCst);
                detached
            };
            drop(detached);
        }
    }

    /// Ages every entry by one tick, visiting buckets in index order and each chain in link
    /// order. Returns the number of evicted entries.
    ///
    /// Evicted entries are dropped once all buckets have been aged, outside of any lock. A
    /// panicking `Drop` of a value therefore cannot cut the pass short.
    pub fn sweep(&self, now: Instant) -> usize {
        let (expiry, idle) = (self.expiry, self.idle);
        let mut evicted = Vec::new();
        for chain in self.chains.iter() {
            let mut chain = chain.lock();
            if chain.is_empty() {
                continue;
            }
            let gone = chain.sweep(|e| e.age(expiry, now, idle));
            self.count.fetch_sub(gone.len(), Ordering::SeqCst);
            evicted.extend(gone);
        }
        let total = evicted.len();
        drop(evicted);
        total
    }

    /// Number of entries reachable through the chains, counted the slow way.
    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.chains.iter().map(|c| c.lock().len()).sum()
    }

    /// Walks all chains and refreshes every visited entry.
    fn visit<F>(&self, mut f: F)
    where
        F: FnMut(&Entry<K, V>),
    {
        let ttl = self.ttl;
        for chain in self.chains.iter() {
            chain.lock().for_each_mut(|e| {
                e.touch(ttl);
                f(e)
            });
        }
    }

    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut values = Vec::with_capacity(self.size());
        self.visit(|e| values.push(e.value.clone()));
        values
    }

    pub fn entry_set(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut entries = Vec::with_capacity(self.size());
        self.visit(|e| entries.push((e.key.clone(), e.value.clone())));
        entries
    }

    /// Scans all chains for an entry holding `value`.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        if self.is_empty() {
            return false;
        }
        for chain in self.chains.iter() {
            let mut chain = chain.lock();
            if let Some(e) = chain.find_mut(|e| e.value == *value) {
                e.touch(self.ttl);
                return true;
            }
        }
        false
    }
}

impl<K: Hash + Eq, V> Store<K, V> {
    /// Maps a key to its bucket index.
    pub fn index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut h = FnvHasher::default();
        key.hash(&mut h);
        (h.finish() % self.chains.len() as u64) as usize
    }

    fn chain<Q>(&self, key: &Q) -> &Mutex<Chain<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        &self.chains[self.index(key)]
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let mut chain = self.chain(key).lock();
        let res = chain.get_mut(key).map(|e| {
            e.touch(self.ttl);
            e.value.clone()
        });
        self.metrics.record_lookup(res.is_some());
        res
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut chain = self.chain(key).lock();
        let found = match chain.get_mut(key) {
            Some(e) => {
                e.touch(self.ttl);
                true
            }
            None => false,
        };
        self.metrics.record_lookup(found);
        found
    }

    /// Inserts or overwrites. Returns true if a new entry was created.
    ///
    /// A replaced value is dropped after the bucket lock has been released.
    pub fn put(&self, key: K, value: V) -> bool {
        let mut chain = self.chain(&key).lock();
        let (inserted, replaced) = match chain.get_mut(&key) {
            Some(e) => {
                e.touch(self.ttl);
                (false, Some(mem::replace(&mut e.value, value)))
            }
            None => {
                chain.push(key, value, self.ttl);
                self.count.fetch_add(1, Ordering::SeqCst);
                (true, None)
            }
        };
        drop(chain);
        drop(replaced);
        self.metrics.record_put(inserted);
        inserted
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = {
            let mut chain = self.chain(key).lock();
            let removed = chain.position(key).and_then(|pos| chain.unlink_at(pos));
            if removed.is_some() {
                self.count.fetch_sub(1, Ordering::SeqCst);
            }
            removed
        };
        removed.map(|e| {
            self.metrics.record_removal();
            e.value
        })
    }

    pub fn key_set(&self) -> HashSet<K>
    where
        K: Clone,
    {
        let mut keys = HashSet::with_capacity(self.size());
        self.visit(|e| {
            keys.insert(e.key.clone());
        });
        keys
    }
}
