//! Requests this node has sent out and not yet seen answered.
//!
//! Entries live in a fixed-size ring; once it wraps, the oldest submission
//! is evicted silently. A result that arrives for an evicted submission is
//! treated as stale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use hashwork_core::ids::JobId;
use hashwork_core::job::Request;
use parking_lot::Mutex;

pub const DEFAULT_SUBMITS_CAPACITY: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("entry {0} already exists")]
    AlreadyExists(JobId),
}

struct Ring {
    entries: Vec<Option<(JobId, Request)>>,
    /// Next slot to write.
    cursor: usize,
    idx: HashMap<JobId, usize>,
}

pub struct SubmissionLedger {
    serial: AtomicU64,
    ring: Mutex<Ring>,
    capacity: usize,
}

impl SubmissionLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            serial: AtomicU64::new(0),
            ring: Mutex::new(Ring {
                entries: vec![None; capacity],
                cursor: 0,
                idx: HashMap::with_capacity(capacity),
            }),
            capacity,
        }
    }

    pub fn put(&self, request: Request, id: JobId) -> Result<(), LedgerError> {
        let mut guard = self.ring.lock();
        let ring = &mut *guard;
        if ring.idx.contains_key(&id) {
            return Err(LedgerError::AlreadyExists(id));
        }

        let slot = ring.cursor;
        ring.cursor = (slot + 1) % self.capacity;
        if let Some((evicted, _)) = ring.entries[slot].take() {
            ring.idx.remove(&evicted);
            tracing::trace!(job_id = %evicted, "submission evicted");
        }
        ring.entries[slot] = Some((id, request));
        ring.idx.insert(id, slot);
        Ok(())
    }

    pub fn have(&self, id: &JobId) -> bool {
        self.ring.lock().idx.contains_key(id)
    }

    pub fn get(&self, id: &JobId) -> Option<Request> {
        let ring = self.ring.lock();
        let slot = *ring.idx.get(id)?;
        ring.entries[slot].as_ref().map(|(_, req)| req.clone())
    }

    pub fn data(&self, id: &JobId) -> Option<Vec<u8>> {
        self.get(id).map(|req| req.data)
    }

    /// Difficulty the job was submitted with, or 0 when unknown.
    pub fn difficulty(&self, id: &JobId) -> u8 {
        let ring = self.ring.lock();
        ring.idx
            .get(id)
            .and_then(|slot| ring.entries[*slot].as_ref())
            .map_or(0, |(_, req)| req.difficulty)
    }

    /// Forget a submission whose result has been acknowledged.
    pub fn remove(&self, id: &JobId) -> Option<Request> {
        let mut ring = self.ring.lock();
        let slot = ring.idx.remove(id)?;
        ring.entries[slot].take().map(|(_, req)| req)
    }

    pub fn inc_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn last_serial(&self) -> u64 {
        self.serial.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.ring.lock().idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SubmissionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_SUBMITS_CAPACITY)
    }
}
