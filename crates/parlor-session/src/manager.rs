//! The session manager: tracks which accounts are logged in.
//!
//! An account may hold at most one lobby session. A second login while
//! the first connection is still open is rejected rather than silently
//! taking over the session.
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain `HashMap` and is not thread-safe by
//! itself. The lobby keeps it behind a mutex and only touches it on
//! login and disconnect.

use std::collections::HashMap;
use std::time::Instant;

use parlor_protocol::PlayerId;

use crate::{Identity, Session, SessionError};

/// Registry of logged-in accounts, keyed by player id.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<PlayerId, Session>,
}

impl SessionManager {
    /// Creates a new, empty session manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a login after successful authentication.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyConnected`] if the account already
    /// has a session.
    pub fn create(
        &mut self,
        identity: Identity,
    ) -> Result<&Session, SessionError> {
        let player_id = identity.player_id;
        if self.sessions.contains_key(&player_id) {
            return Err(SessionError::AlreadyConnected(player_id));
        }

        let session = self.sessions.entry(player_id).or_insert(Session {
            player_id,
            username: identity.username,
            logged_in_at: Instant::now(),
        });
        tracing::info!(%player_id, username = %session.username, "session created");
        Ok(session)
    }

    /// Ends a player's session.
    ///
    /// # Errors
    /// Returns [`SessionError::NotFound`] if no session exists.
    pub fn remove(
        &mut self,
        player_id: PlayerId,
    ) -> Result<Session, SessionError> {
        let session = self
            .sessions
            .remove(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;
        tracing::info!(
            %player_id,
            online_secs = session.logged_in_at.elapsed().as_secs(),
            "session ended"
        );
        Ok(session)
    }

    /// Looks up a session by player ID.
    pub fn get(&self, player_id: &PlayerId) -> Option<&Session> {
        self.sessions.get(player_id)
    }

    /// Returns `true` if the player is logged in.
    pub fn is_online(&self, player_id: &PlayerId) -> bool {
        self.sessions.contains_key(player_id)
    }

    /// Every session, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Returns the number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use super::*;

    fn identity(id: u64, name: &str) -> Identity {
        Identity {
            player_id: PlayerId(id),
            username: name.to_string(),
        }
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_new_player_returns_session() {
        let mut mgr = SessionManager::new();

        let session = mgr.create(identity(1, "ann")).expect("should succeed");

        assert_eq!(session.player_id, PlayerId(1));
        assert_eq!(session.username, "ann");
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_create_duplicate_login_returns_already_connected() {
        let mut mgr = SessionManager::new();
        mgr.create(identity(1, "ann")).unwrap();

        let result = mgr.create(identity(1, "ann"));

        assert!(matches!(
            result,
            Err(SessionError::AlreadyConnected(pid)) if pid == PlayerId(1)
        ));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_create_after_remove_succeeds() {
        let mut mgr = SessionManager::new();
        mgr.create(identity(1, "ann")).unwrap();
        mgr.remove(PlayerId(1)).unwrap();

        assert!(mgr.create(identity(1, "ann")).is_ok());
    }

    // =====================================================================
    // remove()
    // =====================================================================

    #[test]
    fn test_remove_unknown_player_returns_not_found() {
        let mut mgr = SessionManager::new();
        assert!(matches!(
            mgr.remove(PlayerId(9)),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_returns_ended_session() {
        let mut mgr = SessionManager::new();
        mgr.create(identity(2, "bob")).unwrap();

        let ended = mgr.remove(PlayerId(2)).unwrap();

        assert_eq!(ended.username, "bob");
        assert!(mgr.is_empty());
        assert!(!mgr.is_online(&PlayerId(2)));
    }

    // =====================================================================
    // get()
    // =====================================================================

    #[test]
    fn test_get_returns_only_logged_in_players() {
        let mut mgr = SessionManager::new();
        mgr.create(identity(1, "ann")).unwrap();

        assert!(mgr.get(&PlayerId(1)).is_some());
        assert!(mgr.get(&PlayerId(2)).is_none());
    }

    #[test]
    fn test_iter_lists_every_session() {
        let mut mgr = SessionManager::new();
        mgr.create(identity(1, "ann")).unwrap();
        mgr.create(identity(2, "bob")).unwrap();
        mgr.remove(PlayerId(1)).unwrap();

        let names: Vec<&str> = mgr.iter().map(|s| s.username.as_str()).collect();

        assert_eq!(names, vec!["bob"]);
        assert!(mgr.is_online(&PlayerId(2)));
    }
}
