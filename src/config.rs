//! Construction parameters and their validation.

use crate::ExpiringMap;

use log::warn;
use serde::Deserialize;
use std::hash::Hash;
use std::convert::TryFrom;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Default number of bucket chains.
pub const DEFAULT_BUCKETS: usize = 100;

/// Default reaper period in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Largest accepted TTL (in ticks). Larger values are clamped.
// Elapsed-time expiry multiplies the tick interval by the TTL, which takes a u32.
pub const MAX_TTL: i64 = u32::MAX as i64;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Illegal time to live: {0} (must not be negative)")]
    NegativeTtl(i64),
    #[error("Bucket count must be at least 1")]
    NoBuckets,
    #[error("Reaper interval must be at least 1ms")]
    IntervalTooShort,
    #[error("Failed to spawn reaper thread")]
    Spawn(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How a tick decides that an entry has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expiry {
    /// Each entry remembers when it was last accessed. A tick evicts entries which have been idle
    /// for at least `ttl` times the reaper interval, no matter how many ticks have actually fired.
    Elapsed,
    /// Each entry carries a counter of remaining ticks. Every tick decrements it and the entry is
    /// evicted on the tick where the counter would reach zero. Precision depends on the reaper
    /// firing exactly once per interval.
    Countdown,
}

/// When the reaper runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// Background thread ticking at a fixed period.
    Every { interval_ms: u64 },
    /// No background thread. The owner calls [`ExpiringMap::reap`] from its own timer, which is
    /// expected to fire every `interval_ms`. The period only matters for elapsed-time expiry.
    Manual {
        #[serde(default = "default_interval_ms")]
        interval_ms: u64,
    },
}

impl Schedule {
    /// Truncates to whole milliseconds.
    pub fn every(interval: Duration) -> Self {
        Schedule::Every {
            interval_ms: millis(interval),
        }
    }

    pub fn manual(interval: Duration) -> Self {
        Schedule::Manual {
            interval_ms: millis(interval),
        }
    }

    /// Length of one tick.
    pub fn interval(&self) -> Duration {
        match *self {
            Schedule::Every { interval_ms } | Schedule::Manual { interval_ms } => {
                Duration::from_millis(interval_ms)
            }
        }
    }

    /// Expiry mode used when none is configured. Ticks driven by the owner are counted, ticks of
    /// the background thread are timed.
    pub fn default_expiry(&self) -> Expiry {
        match self {
            Schedule::Every { .. } => Expiry::Elapsed,
            Schedule::Manual { .. } => Expiry::Countdown,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Every {
            interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

/// Builder for [`ExpiringMap`].
///
/// Can be deserialized from any serde format so that hosts are able to keep cache parameters in
/// their own configuration files:
///
/// ```
/// let cfg: ttlmap::Config = serde_json::from_str(r#"{"ttl": 30, "buckets": 64}"#).unwrap();
/// assert_eq!(cfg.buckets, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Idle ticks before an entry gets evicted
    pub ttl: i64,
    #[serde(default = "default_buckets")]
    pub buckets: usize,
    /// Unset means [`Schedule::default_expiry`]
    #[serde(default)]
    pub expiry: Option<Expiry>,
    #[serde(default)]
    pub schedule: Schedule,
}

fn default_buckets() -> usize {
    DEFAULT_BUCKETS
}

impl Config {
    pub fn new(ttl: i64) -> Self {
        Self {
            ttl,
            buckets: DEFAULT_BUCKETS,
            expiry: None,
            schedule: Schedule::default(),
        }
    }

    /// Sets the number of bucket chains. The array is never resized afterwards.
    pub fn buckets(&mut self, n: usize) -> &mut Self {
        self.buckets = n;
        self
    }

    pub fn expiry(&mut self, e: Expiry) -> &mut Self {
        self.expiry = Some(e);
        self
    }

    /// Expiry mode the map will use.
    pub fn effective_expiry(&self) -> Expiry {
        self.expiry.unwrap_or_else(|| self.schedule.default_expiry())
    }

    /// Starts a background reaper ticking every `interval` (millisecond resolution).
    pub fn interval(&mut self, interval: Duration) -> &mut Self {
        self.schedule = Schedule::every(interval);
        self
    }

    /// Does not start a reaper thread. Ticks happen only through [`ExpiringMap::reap`].
    ///
    /// A previously set interval is kept as the length of one tick. Unless an expiry mode is set
    /// explicitly, the map counts ticks, so a TTL of `n` means `n` calls to `reap`.
    pub fn manual(&mut self) -> &mut Self {
        self.schedule = Schedule::manual(self.schedule.interval());
        self
    }

    /// Validates the parameters and returns the effective TTL.
    ///
    /// # Errors
    ///
    /// Fails with `NegativeTtl`, `NoBuckets` or `IntervalTooShort`.
    pub fn check(&self) -> Result<u32> {
        if self.buckets == 0 {
            return Err(Error::NoBuckets);
        }
        if self.schedule.interval() < Duration::from_millis(1) {
            return Err(Error::IntervalTooShort);
        }
        clamp_ttl(self.ttl)
    }

    /// Creates the map and, unless the schedule is manual, starts its reaper.
    pub fn build<K, V>(&self) -> Result<ExpiringMap<K, V>>
    where
        K: Hash + Eq + Send + 'static,
        V: Send + 'static,
    {
        ExpiringMap::with_config(self)
    }
}

fn clamp_ttl(ttl: i64) -> Result<u32> {
    if ttl < 0 {
        return Err(Error::NegativeTtl(ttl));
    }
    if ttl > MAX_TTL {
        warn!("TTL {} exceeds maximum, clamping to {}", ttl, MAX_TTL);
    }
    Ok(ttl.min(MAX_TTL) as u32)
}
