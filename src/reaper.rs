//! Background eviction thread.

use crate::config::Result;
use crate::store::Store;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use log::{debug, error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Runs one eviction pass over `store` and returns the number of evicted entries.
///
/// A panic raised during the pass (e.g., from a value's `Drop` impl) is caught, logged and
/// counted as failed tick so that the periodic schedule keeps going.
pub fn tick<K, V>(store: &Store<K, V>) -> usize {
    match panic::catch_unwind(AssertUnwindSafe(|| store.sweep(Instant::now()))) {
        Ok(n) => {
            store.metrics.record_tick(n);
            if n > 0 {
                debug!("Evicted {} stale entries, {} left", n, store.size());
            }
            n
        }
        Err(cause) => {
            store.metrics.record_failed_tick();
            error!("Eviction pass failed: {}", panic_message(&*cause));
            0
        }
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(s) = cause.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown cause"
    }
}

/// Handle to a thread which calls [`tick`] periodically.
///
/// The thread shuts down when the handle is stopped or dropped. Both wait until the thread has
/// exited, so no pass runs afterwards.
#[derive(Debug)]
pub struct Reaper {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn spawn<K, V>(store: Arc<Store<K, V>>, interval: Duration) -> Result<Self>
    where
        K: Send + 'static,
        V: Send + 'static,
    {
        let (shutdown, shutdown_rx) = channel::bounded(0);
        let thread = thread::Builder::new()
            .name("ttlmap-reaper".to_owned())
            .spawn(move || run(&store, interval, shutdown_rx))?;
        Ok(Self {
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Signals the thread to exit and waits for it.
    pub fn stop(&mut self) {
        // disconnecting the channel wakes up the thread
        drop(self.shutdown.take());
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                error!("Reaper thread terminated abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop()
    }
}

fn run<K, V>(store: &Store<K, V>, interval: Duration, shutdown: Receiver<()>) {
    info!(
        "Reaper started: {} buckets, ttl {}, every {:?}",
        store.buckets(),
        store.ttl(),
        interval
    );
    let ticker = channel::tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                tick(store);
            }
            recv(shutdown) -> _ => break,
        }
    }
    info!(
        "Reaper stopped after {} ticks",
        store.metrics.snapshot().ticks
    );
}
