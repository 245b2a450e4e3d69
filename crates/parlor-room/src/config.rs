//! Room configuration and join codes.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room in a registry.
///
/// Player bounds are per room (they come from the game catalog), so they
/// are not part of this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// An open room with no mutations for this long is closed.
    pub idle_timeout: Duration,

    /// Command channel capacity of each room actor.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(600),
            channel_size: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Join codes
// ---------------------------------------------------------------------------

/// Length of a room join code.
pub const CODE_LEN: usize = 6;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a random `[A-Z0-9]{6}` join code.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| {
            let i = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[i] as char
        })
        .collect()
}

/// Canonical form of a user-typed code: trimmed and uppercased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
