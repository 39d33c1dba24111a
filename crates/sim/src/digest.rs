//! StateDigest: the 64-bit fingerprint of a `World`.
//!
//! Peers exchange digests of confirmed frames to detect desyncs, and replay
//! artifacts anchor their initial and final state with them. The byte
//! stream fed to the hasher is little-endian and every `f64` is
//! canonicalized first, so two worlds that compare equal always hash equal.

/// StateDigest algorithm identifier, recorded in replay artifacts.
pub const STATE_DIGEST_ALGO_ID: &str = "statedigest-v1-fnv1a64-le-f64canon-cidasc-full";

/// FNV-1a 64-bit offset basis.
const FNV1A_OFFSET_BASIS: u64 = 0xcbf29ce484222325;

/// FNV-1a 64-bit prime.
const FNV1A_PRIME: u64 = 0x100000001b3;

/// Incremental FNV-1a 64-bit hasher with typed write helpers.
#[derive(Debug, Clone)]
pub struct StateHasher {
    state: u64,
}

impl StateHasher {
    pub fn new() -> Self {
        Self {
            state: FNV1A_OFFSET_BASIS,
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV1A_PRIME);
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_f64(&mut self, value: f64) {
        self.write_u64(canonicalize_f64(value));
    }

    /// Presence byte followed by the value, so `None` and `Some(0.0)` differ.
    pub fn write_opt_f64(&mut self, value: Option<f64>) {
        match value {
            Some(v) => {
                self.write_u8(1);
                self.write_f64(v);
            }
            None => self.write_u8(0),
        }
    }

    pub fn finish(self) -> u64 {
        self.state
    }
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Types that contribute their full state to a StateDigest.
pub trait Digestible {
    fn digest_into(&self, hasher: &mut StateHasher);
}

/// Canonicalize an f64 value for deterministic hashing.
///
/// - `-0.0` → `+0.0`
/// - Any NaN → quiet NaN bit pattern `0x7ff8000000000000`
pub fn canonicalize_f64(value: f64) -> u64 {
    const QUIET_NAN_BITS: u64 = 0x7ff8000000000000;

    if value.is_nan() {
        QUIET_NAN_BITS
    } else if value == 0.0 {
        0u64
    } else {
        value.to_bits()
    }
}
