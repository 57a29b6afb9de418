//! Single bucket chain.
//!
//! A `Chain` is a singly-linked list of boxed entries. Every link is owned by its predecessor
//! (or by the chain head), so unlinking an entry is a matter of moving its `next` box into the
//! slot which owned the entry.
//!
//! None of the mutating methods call user code (`Hash`, `Eq`, `Drop`) while links are being
//! rewritten. Comparisons happen in a read-only scan beforehand and unlinked entries are handed
//! back to the caller for dropping. A panicking user impl therefore cannot leave a chain
//! half-relinked.

use crate::config::Expiry;

use std::borrow::Borrow;
use std::fmt;
use std::time::{Duration, Instant};

pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
    /// Ticks left before eviction (countdown expiry)
    remaining: u32,
    /// Last access (elapsed-time expiry)
    touched: Instant,
    next: Option<Box<Entry<K, V>>>,
}

impl<K, V> Entry<K, V> {
    fn new(key: K, value: V, ttl: u32) -> Self {
        Self {
            key,
            value,
            remaining: ttl,
            touched: Instant::now(),
            next: None,
        }
    }

    /// Resets the idle budget to the full TTL.
    pub fn touch(&mut self, ttl: u32) {
        self.remaining = ttl;
        self.touched = Instant::now();
    }

    /// Ages the entry by one tick. Returns true if it is due for eviction.
    ///
    /// Countdown: the entry expires on the tick where the counter would drop to zero, so with
    /// TTL 3 it survives two ticks and goes away on the third. TTL 0 expires on the first tick.
    ///
    /// Elapsed: the entry expires once it has been idle for at least `idle`.
    pub fn age(&mut self, expiry: Expiry, now: Instant, idle: Duration) -> bool {
        match expiry {
            Expiry::Countdown => {
                if self.remaining <= 1 {
                    true
                } else {
                    self.remaining -= 1;
                    false
                }
            }
            Expiry::Elapsed => now.saturating_duration_since(self.touched) >= idle,
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry({:?}, remaining={})", self.key, self.remaining)
    }
}

#[derive(Debug)]
pub struct Chain<K, V> {
    head: Option<Box<Entry<K, V>>>,
    len: usize,
}

impl<K, V> Default for Chain<K, V> {
    fn default() -> Self {
        Self { head: None, len: 0 }
    }
}

impl<K, V> Chain<K, V> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the first entry (in link order) for which `pred` holds.
    pub fn find_mut<F>(&mut self, mut pred: F) -> Option<&mut Entry<K, V>>
    where
        F: FnMut(&Entry<K, V>) -> bool,
    {
        let mut link = self.head.as_deref_mut();
        while let Some(e) = link {
            if pred(e) {
                return Some(e);
            }
            link = e.next.as_deref_mut();
        }
        None
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.find_mut(|e| key.eq(e.key.borrow()))
    }

    /// Position of `key` in link order.
    pub fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut link = self.head.as_deref();
        let mut pos = 0;
        while let Some(e) = link {
            if key.eq(e.key.borrow()) {
                return Some(pos);
            }
            link = e.next.as_deref();
            pos += 1;
        }
        None
    }

    /// Calls `f` for every entry in link order.
    pub fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Entry<K, V>),
    {
        let mut link = self.head.as_deref_mut();
        while let Some(e) = link {
            f(e);
            link = e.next.as_deref_mut();
        }
    }

    /// Appends a fresh entry at the tail.
    pub fn push(&mut self, key: K, value: V, ttl: u32) {
        let mut link = &mut self.head;
        while let Some(e) = link {
            link = &mut e.next;
        }
        *link = Some(Box::new(Entry::new(key, value, ttl)));
        self.len += 1;
    }

    /// Unlinks the entry at `pos`, re-pointing the head if it was first.
    pub fn unlink_at(&mut self, pos: usize) -> Option<Box<Entry<K, V>>> {
        let mut link = &mut self.head;
        for _ in 0..pos {
            link = &mut link.as_mut()?.next;
        }
        let mut e = link.take()?;
        *link = e.next.take();
        self.len -= 1;
        Some(e)
    }

    /// Visits every entry once in link order and unlinks those for which `expired` returns
    /// true. The walk continues behind an unlinked entry without restarting.
    pub fn sweep<F>(&mut self, mut expired: F) -> Vec<Box<Entry<K, V>>>
    where
        F: FnMut(&mut Entry<K, V>) -> bool,
    {
        let mut evicted = Vec::new();
        let mut link = &mut self.head;
        loop {
            let due = match link.as_deref_mut() {
                None => break,
                Some(e) => expired(e),
            };
            if due {
                if let Some(mut e) = link.take() {
                    *link = e.next.take();
                    self.len -= 1;
                    evicted.push(e);
                }
            } else if let Some(e) = link {
                link = &mut e.next;
            }
        }
        evicted
    }

    /// Detaches all entries. The returned chain owns them and can be dropped outside of any
    /// lock.
    pub fn take(&mut self) -> Chain<K, V> {
        std::mem::take(self)
    }
}

// Dropping a long chain recursively through `Box` could exhaust the stack.
impl<K, V> Drop for Chain<K, V> {
    fn drop(&mut self) {
        let mut link = self.head.take();
        while let Some(mut e) = link {
            link = e.next.take();
        }
    }
}
