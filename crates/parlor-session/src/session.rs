//! Login session records.

use std::time::Instant;

use parlor_protocol::PlayerId;

/// A logged-in account on the lobby.
///
/// Lives from a successful `Authenticate` until the connection closes.
#[derive(Debug, Clone)]
pub struct Session {
    pub player_id: PlayerId,
    /// Shown to other room members.
    pub username: String,
    pub logged_in_at: Instant,
}
