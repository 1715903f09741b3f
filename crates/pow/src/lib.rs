//! Brute-force SHA-1 proof-of-work.
//!
//! A job is solved by appending an 8-byte nonce to the job data and
//! incrementing it until `sha1(data ‖ nonce)` starts with `difficulty`
//! zero bits. The search is a single sequential loop that checks its
//! cancellation token once per hash, so cancellation latency is one hash.

use std::time::Duration;

use sha1::{Digest, Sha1};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;

/// Bytes of nonce space appended to the job data.
pub const NONCE_SIZE: usize = 8;

/// SHA-1 digest length.
pub const HASH_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    pub nonce: Vec<u8>,
    pub hash: Vec<u8>,
    pub attempts: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum PowError {
    #[error("search cancelled")]
    Cancelled,

    #[error("no solution found within {0:?}")]
    TimedOut(Duration),

    #[error("difficulty {0} exceeds the digest size")]
    Unreachable(u8),

    #[error("nonce space exhausted")]
    Exhausted,

    #[error("task join failed: {0}")]
    JoinFailed(#[from] tokio::task::JoinError),
}

/// Whether the first `difficulty` bits of `hash` are zero.
///
/// Bits are counted from the most significant bit of the first byte.
pub fn meets_difficulty(hash: &[u8], difficulty: u8) -> bool {
    let bits = difficulty as usize;
    if bits > hash.len() * 8 {
        return false;
    }

    let full = bits / 8;
    if hash[..full].iter().any(|b| *b != 0) {
        return false;
    }

    let rem = bits % 8;
    rem == 0 || hash[full] & (0xffu8 << (8 - rem)) == 0
}

/// Big-endian increment with carry. Returns `false` once the nonce wraps
/// back to all zeros.
pub fn increment_nonce(nonce: &mut [u8]) -> bool {
    for b in nonce.iter_mut().rev() {
        *b = b.wrapping_add(1);
        if *b != 0 {
            return true;
        }
    }
    false
}

/// Search for a nonce satisfying `difficulty`, blocking the current thread.
pub fn mine(
    data: &[u8],
    difficulty: u8,
    cancel: &CancellationToken,
) -> Result<Solution, PowError> {
    if difficulty as usize > HASH_SIZE * 8 {
        return Err(PowError::Unreachable(difficulty));
    }

    let split = data.len();
    let mut buf = Vec::with_capacity(split + NONCE_SIZE);
    buf.extend_from_slice(data);
    buf.resize(split + NONCE_SIZE, 0);

    let mut attempts = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(PowError::Cancelled);
        }

        let hash = Sha1::digest(&buf);
        attempts += 1;
        if meets_difficulty(&hash, difficulty) {
            return Ok(Solution {
                nonce: buf[split..].to_vec(),
                hash: hash.to_vec(),
                attempts,
            });
        }

        if !increment_nonce(&mut buf[split..]) {
            return Err(PowError::Exhausted);
        }
    }
}

/// Run [`mine`] on the blocking pool, bounded by `deadline`.
///
/// The search is cancelled when the deadline passes, when `shutdown` fires,
/// or when the returned future is dropped.
pub async fn solve(
    data: Vec<u8>,
    difficulty: u8,
    deadline: Duration,
    shutdown: &CancellationToken,
) -> Result<Solution, PowError> {
    let cancel = shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let search = spawn_blocking({
        let cancel = cancel.clone();
        move || mine(&data, difficulty, &cancel)
    });

    match tokio::time::timeout(deadline, search).await {
        Ok(joined) => joined?,
        Err(_) => {
            tracing::trace!(difficulty, ?deadline, "search deadline reached");
            Err(PowError::TimedOut(deadline))
        }
    }
}

pub fn digest(data: &[u8], nonce: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.update(nonce);
    hasher.finalize().into()
}

/// Re-hash `data ‖ nonce` and compare against the claimed `hash`.
pub fn check(hash: &[u8], data: &[u8], nonce: &[u8]) -> bool {
    if hash.is_empty() || nonce.is_empty() {
        return false;
    }
    digest(data, nonce)[..] == *hash
}

/// [`check`], plus the claimed hash must actually meet `difficulty`.
pub fn verify(hash: &[u8], data: &[u8], nonce: &[u8], difficulty: u8) -> bool {
    check(hash, data, nonce) && meets_difficulty(hash, difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_difficulty_is_always_met() {
        assert!(meets_difficulty(&[0xff; HASH_SIZE], 0));
    }

    #[test]
    fn partial_byte_masks_high_bits() {
        let mut hash = [0xffu8; HASH_SIZE];
        hash[0] = 0b0011_1111;
        assert!(meets_difficulty(&hash, 2));
        assert!(!meets_difficulty(&hash, 3));

        hash[0] = 0x00;
        hash[1] = 0b0111_1111;
        assert!(meets_difficulty(&hash, 9));
        assert!(!meets_difficulty(&hash, 10));
    }

    #[test]
    fn low_bits_do_not_count() {
        let mut hash = [0x00u8; HASH_SIZE];
        hash[HASH_SIZE - 1] = 0xff;
        assert!(meets_difficulty(&hash, 16));
        hash[0] = 0x01;
        assert!(!meets_difficulty(&hash, 8));
        assert!(meets_difficulty(&hash, 7));
    }

    #[test]
    fn difficulty_beyond_digest_is_never_met() {
        assert!(meets_difficulty(&[0u8; HASH_SIZE], 160));
        assert!(!meets_difficulty(&[0u8; HASH_SIZE], 161));
    }

    #[test]
    fn nonce_increment_carries_big_endian() {
        let mut nonce = [0x00, 0x00, 0xff];
        assert!(increment_nonce(&mut nonce));
        assert_eq!(nonce, [0x00, 0x01, 0x00]);

        let mut nonce = [0xff, 0xff];
        assert!(!increment_nonce(&mut nonce));
        assert_eq!(nonce, [0x00, 0x00]);
    }
}
