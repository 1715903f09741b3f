use serde::{Deserialize, Serialize};

use crate::{enums::StatusCode, ids::JobId};

/// Capability advertisement, sent once on every new connection.
///
/// `difficulty > 0` means the node accepts hashing jobs up to that many
/// leading zero bits. `max_payload_size` bounds the data of one request;
/// zero means no limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skills {
    pub difficulty: u8,
    pub max_payload_size: u16,
}

impl Skills {
    pub fn is_worker(&self) -> bool {
        self.difficulty > 0
    }

    /// The same skills with the payload ceiling bounded by `limit`; an
    /// unlimited (zero) ceiling becomes `limit`.
    pub fn capped(self, limit: u16) -> Self {
        let max_payload_size = match self.max_payload_size {
            0 => limit,
            n => n.min(limit),
        };
        Self {
            max_payload_size,
            ..self
        }
    }

    pub fn accepts(&self, difficulty: u8, payload_len: usize) -> bool {
        self.is_worker()
            && self.difficulty >= difficulty
            && (self.max_payload_size == 0 || payload_len <= self.max_payload_size as usize)
    }
}

/// Acknowledgment or error reply referring to a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: JobId,
    pub code: StatusCode,
}

/// A hashing job sent to a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: JobId,
    pub data: Vec<u8>,
    pub difficulty: u8,
}

/// The solution to a [`Request`], sent back by the worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: JobId,
    pub nonce: Vec<u8>,
    pub hash: Vec<u8>,
}
