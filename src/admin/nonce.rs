//! Time-limited action nonces.
//!
//! A nonce is a keyed BLAKE3 hash of the action name and a 12 hour tick.
//! It verifies during the tick it was issued in and the one after.

use crate::store::Clock;

/// Length of one nonce tick in seconds
pub const TICK_SECS: u64 = 12 * 60 * 60;

/// Hex characters kept from the hash
const NONCE_LEN: usize = 12;

const KEY_CONTEXT: &str = "edgeshift 2024 admin action nonce";

#[derive(Debug, Clone)]
pub struct Nonces {
    key: [u8; 32],
    clock: Clock,
}

impl Nonces {
    pub fn new(secret: &str, clock: Clock) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            clock,
        }
    }

    /// Nonce for `action` valid now.
    pub fn create(&self, action: &str) -> String {
        self.at_tick(action, self.tick())
    }

    /// Check a nonce against the current and the previous tick.
    pub fn verify(&self, action: &str, nonce: &str) -> bool {
        if nonce.len() != NONCE_LEN {
            return false;
        }
        // blake3::Hash compares in constant time
        let given = blake3::hash(nonce.as_bytes());
        let tick = self.tick();
        [tick, tick.saturating_sub(1)]
            .iter()
            .any(|&t| blake3::hash(self.at_tick(action, t).as_bytes()) == given)
    }

    fn tick(&self) -> u64 {
        self.clock.now_secs().div_ceil(TICK_SECS)
    }

    fn at_tick(&self, action: &str, tick: u64) -> String {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(action.as_bytes());
        hasher.update(b"|");
        hasher.update(&tick.to_le_bytes());
        let mut nonce = hex::encode(hasher.finalize().as_bytes());
        nonce.truncate(NONCE_LEN);
        nonce
    }
}
