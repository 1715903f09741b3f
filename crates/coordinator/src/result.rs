//! Computed results waiting for the requester's acknowledgment.
//!
//! Unlike the submission ledger this store never evicts to make room: when
//! it is full, `put` fails and the coordinator answers new requests with
//! `Busy`. Results that stay unacknowledged past the release delay are
//! flushed by a background sweep and handed to the expired sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hashwork_core::ids::JobId;
use hashwork_core::job::JobResult;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_RESULTS_CAPACITY: usize = 1000;
pub const DEFAULT_RELEASE_DELAY: Duration = Duration::from_secs(2);

/// Receives every result that expired without acknowledgment, exactly once.
pub type ExpiredSink = Arc<dyn Fn(JobResult) + Send + Sync>;

struct ResultEntry {
    id: JobId,
    result: JobResult,
    expires: Instant,
}

struct Store {
    entries: Vec<ResultEntry>,
    idx: HashMap<JobId, usize>,
}

impl Store {
    /// Swap-remove: the last entry takes the freed slot.
    fn remove(&mut self, id: &JobId) -> Option<ResultEntry> {
        let slot = self.idx.remove(id)?;
        let entry = self.entries.swap_remove(slot);
        if let Some(moved) = self.entries.get(slot) {
            self.idx.insert(moved.id, slot);
        }
        Some(entry)
    }
}

pub struct ResultLedger {
    store: Mutex<Store>,
    capacity: usize,
    release_delay: Duration,
    sink: Option<ExpiredSink>,
}

impl ResultLedger {
    pub fn new(capacity: usize, release_delay: Duration, sink: Option<ExpiredSink>) -> Self {
        Self {
            store: Mutex::new(Store {
                entries: Vec::with_capacity(capacity),
                idx: HashMap::with_capacity(capacity),
            }),
            capacity,
            release_delay,
            sink,
        }
    }

    /// Store a result. Returns `false`, leaving the ledger untouched, when it
    /// is full or already holds `id`.
    pub fn put(&self, id: JobId, result: JobResult) -> bool {
        let mut store = self.store.lock();
        if store.entries.len() >= self.capacity || store.idx.contains_key(&id) {
            return false;
        }
        let slot = store.entries.len();
        store.entries.push(ResultEntry {
            id,
            result,
            expires: Instant::now() + self.release_delay,
        });
        store.idx.insert(id, slot);
        true
    }

    pub fn get(&self, id: &JobId) -> Option<JobResult> {
        let store = self.store.lock();
        let slot = *store.idx.get(id)?;
        Some(store.entries[slot].result.clone())
    }

    /// Drop an acknowledged result. Deleting an unknown id is a no-op.
    pub fn delete(&self, id: &JobId) -> bool {
        self.store.lock().remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Flush every expired entry to the sink. Returns how many were flushed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<JobResult> = {
            let mut store = self.store.lock();
            let ids: Vec<JobId> = store
                .entries
                .iter()
                .filter(|e| e.expires <= now)
                .map(|e| e.id)
                .collect();
            ids.iter()
                .filter_map(|id| store.remove(id))
                .map(|e| e.result)
                .collect()
        };

        let flushed = expired.len();
        if let Some(sink) = &self.sink {
            for result in expired {
                sink(result);
            }
        }
        flushed
    }

    /// Spawn the expiry sweep on the current runtime.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).sweep(shutdown))
    }

    /// Sweep loop: sleeps until the oldest entry expires (at most one
    /// release delay) and prunes, until `shutdown` fires.
    pub async fn sweep(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            let wake = self.next_wake();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep_until(wake) => {}
            }

            let flushed = self.prune();
            if flushed > 0 {
                tracing::debug!(flushed, remaining = self.count(), "flushed expired results");
            }
        }
        tracing::debug!("result sweep stopped");
    }

    fn next_wake(&self) -> Instant {
        let latest = Instant::now() + self.release_delay;
        let store = self.store.lock();
        store
            .entries
            .iter()
            .map(|e| e.expires)
            .min()
            .map_or(latest, |earliest| earliest.min(latest))
    }
}
