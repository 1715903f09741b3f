use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Identifies one job across both ledgers and every message that refers to it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub [u8; 8]);

impl JobId {
    /// Truncated `sha1(data ‖ serial)`, serial encoded little-endian.
    pub fn derive(data: &[u8], serial: u64) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        hasher.update(serial.to_le_bytes());
        let digest = hasher.finalize();

        let mut id = [0u8; 8];
        id.copy_from_slice(&digest[..8]);
        JobId(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// First eight bytes in hex, enough to tell peers apart in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
