//! Generic test helpers

use std::time::{Duration, Instant};
use ttlmap::{Config, Expiry, ExpiringMap};

#[allow(unused)]
pub fn init_log() {
    env_logger::try_init().ok();
}

/// Tick-counting map without background thread, aged only by explicit `reap()` calls.
#[allow(unused)]
pub fn manual<V>(ttl: i64) -> ExpiringMap<String, V>
where
    V: Send + 'static,
{
    init_log();
    Config::new(ttl)
        .expiry(Expiry::Countdown)
        .manual()
        .build()
        .expect("build manual map")
}

/// Runs `n` eviction passes and returns the total number of evicted entries.
#[allow(unused)]
pub fn ticks<V>(map: &ExpiringMap<String, V>, n: usize) -> usize {
    (0..n).map(|_| map.reap()).sum()
}

/// Finds `n` distinct keys which share a single bucket.
#[allow(unused)]
pub fn colliding_keys<V>(map: &ExpiringMap<String, V>, n: usize) -> Vec<String> {
    let target = map.bucket("key0");
    (0..)
        .map(|i| format!("key{}", i))
        .filter(|k| map.bucket(k.as_str()) == target)
        .take(n)
        .collect()
}

/// Polls `cond` until it holds or `timeout` passes.
#[allow(unused)]
pub fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
