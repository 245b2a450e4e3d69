//! Room registry: creates rooms, tracks membership, routes operations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use parlor_protocol::{
    GameId, MemberView, PlayerId, RoomId, RoomRef, RoomSnapshot, RoomSummary,
};
use tokio::sync::mpsc;

use crate::config::{generate_code, normalize_code};
use crate::room::{EventSender, NewRoom, spawn_room, summarize};
use crate::{PlayerSender, RoomConfig, RoomError, RoomEvent, RoomHandle};

/// Counter for generating unique room IDs.
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Arguments to [`RoomRegistry::create_room`].
#[derive(Debug, Clone)]
pub struct CreateRoom {
    pub game_id: GameId,
    pub owner: PlayerId,
    pub owner_name: String,
    pub min_players: usize,
    pub max_players: usize,
    pub config: serde_json::Value,
}

/// Every room in the lobby, plus which player is in which room.
///
/// A player is in at most one room at a time. The index sits behind a
/// short-lived lock that is never held while waiting on a room actor, so
/// a slow room does not stall operations on the others. Per-room
/// mutations are serialized by the room actors.
pub struct RoomRegistry {
    config: RoomConfig,
    index: Mutex<Index>,
    events: EventSender,
}

#[derive(Default)]
struct Index {
    rooms: HashMap<RoomId, RoomHandle>,
    codes: HashMap<String, RoomId>,
    player_rooms: HashMap<PlayerId, RoomId>,
}

impl Index {
    fn handle(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        self.rooms
            .get(&room_id)
            .cloned()
            .ok_or(RoomError::NotFound(room_id))
    }

    fn forget(&mut self, room_id: RoomId) {
        if let Some(handle) = self.rooms.remove(&room_id) {
            self.codes.remove(handle.code());
            tracing::debug!(%room_id, "room forgotten");
        }
        self.player_rooms.retain(|_, rid| *rid != room_id);
    }

    /// Unavailable means the actor stopped on its own; drop our
    /// references so the caller sees NotFound from now on.
    fn forget_if_gone<T>(
        &mut self,
        room_id: RoomId,
        result: Result<T, RoomError>,
    ) -> Result<T, RoomError> {
        if matches!(result, Err(RoomError::Unavailable(_))) {
            self.forget(room_id);
            return Err(RoomError::NotFound(room_id));
        }
        result
    }

    fn unused_code(&self) -> String {
        loop {
            let code = generate_code();
            if !self.codes.contains_key(&code) {
                return code;
            }
        }
    }
}

impl RoomRegistry {
    /// Creates an empty registry and the receiver for its room events.
    pub fn new(config: RoomConfig) -> (Self, mpsc::UnboundedReceiver<RoomEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let registry = Self {
            config,
            index: Mutex::new(Index::default()),
            events,
        };
        (registry, rx)
    }

    /// Creates a room with the owner as its first member.
    ///
    /// # Errors
    /// [`RoomError::InvalidBounds`] unless `1 <= min <= max`, and
    /// [`RoomError::AlreadyInRoom`] if the owner is in another room.
    pub fn create_room(
        &self,
        request: CreateRoom,
        owner_sender: PlayerSender,
    ) -> Result<RoomId, RoomError> {
        let CreateRoom {
            game_id,
            owner,
            owner_name,
            min_players,
            max_players,
            config,
        } = request;
        if min_players == 0 || max_players < min_players {
            return Err(RoomError::InvalidBounds {
                min: min_players,
                max: max_players,
            });
        }

        let mut index = self.index();
        if let Some(current) = index.player_rooms.get(&owner) {
            return Err(RoomError::AlreadyInRoom(owner, *current));
        }

        let room_id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));
        let code = index.unused_code();
        let handle = spawn_room(
            NewRoom {
                room_id,
                code: code.clone(),
                game_id: game_id.clone(),
                owner,
                owner_name,
                owner_sender,
                min_players,
                max_players,
                config,
            },
            self.config.idle_timeout,
            self.config.channel_size,
            self.events.clone(),
        );

        index.rooms.insert(room_id, handle);
        index.codes.insert(code.clone(), room_id);
        index.player_rooms.insert(owner, room_id);
        tracing::info!(%room_id, %code, game = %game_id, %owner, "room created");
        Ok(room_id)
    }

    /// Resolves a room id or join code.
    pub fn resolve(&self, room: &RoomRef) -> Result<RoomId, RoomError> {
        let index = self.index();
        match room {
            RoomRef::Id(id) if index.rooms.contains_key(id) => Ok(*id),
            RoomRef::Id(id) => Err(RoomError::NotFound(*id)),
            RoomRef::Code(code) => index
                .codes
                .get(&normalize_code(code))
                .copied()
                .ok_or_else(|| RoomError::CodeNotFound(code.clone())),
        }
    }

    /// Adds a player to an open room.
    ///
    /// Fails without side effects if the room is full, not open, or the
    /// player is already in a room.
    pub async fn join_room(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        display_name: String,
        sender: PlayerSender,
    ) -> Result<MemberView, RoomError> {
        let handle = {
            let index = self.index();
            if let Some(current) = index.player_rooms.get(&player_id) {
                return Err(RoomError::AlreadyInRoom(player_id, *current));
            }
            index.handle(room_id)?
        };

        let result = handle.join(player_id, display_name, sender).await;
        let mut index = self.index();
        let member = index.forget_if_gone(room_id, result)?;
        // A room that closed while the join was in flight keeps no index
        // entries.
        if index.rooms.contains_key(&room_id) {
            index.player_rooms.insert(player_id, room_id);
        }
        Ok(member)
    }

    pub async fn set_ready(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id)?;
        let result = handle.set_ready(player_id, ready).await;
        self.index().forget_if_gone(room_id, result)
    }

    /// Removes a player from a room. The room closes if the owner of an
    /// open room leaves or it becomes empty.
    pub async fn leave_room(
        &self,
        room_id: RoomId,
        player_id: PlayerId,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id)?;

        let result = handle.leave(player_id).await;
        let mut index = self.index();
        if matches!(result, Err(RoomError::Unavailable(_))) {
            index.forget(room_id);
            return Ok(());
        }
        let closed = result?;
        index.player_rooms.remove(&player_id);
        if closed {
            index.forget(room_id);
        }
        Ok(())
    }

    /// Summaries of every live room, optionally only for one game,
    /// ordered by room id.
    pub async fn list_rooms(&self, game_id: Option<&GameId>) -> Vec<RoomSummary> {
        let mut handles: Vec<RoomHandle> =
            self.index().rooms.values().cloned().collect();
        handles.sort_by_key(|h| h.room_id());

        let mut rooms = Vec::with_capacity(handles.len());
        for handle in handles {
            // Rooms that stopped since the last event are skipped.
            let Ok(snapshot) = handle.snapshot().await else {
                continue;
            };
            if game_id.is_some_and(|g| *g != snapshot.game_id) {
                continue;
            }
            rooms.push(summarize(&snapshot));
        }
        rooms
    }

    pub async fn snapshot(&self, room_id: RoomId) -> Result<RoomSnapshot, RoomError> {
        let handle = self.handle(room_id)?;
        let result = handle.snapshot().await;
        self.index().forget_if_gone(room_id, result)
    }

    /// Starting → InProgress once the game server is ready. Only the bind
    /// address is kept; the supervisor owns the process.
    pub async fn mark_in_progress(
        &self,
        room_id: RoomId,
        bind_addr: String,
    ) -> Result<(), RoomError> {
        self.handle(room_id)?.mark_in_progress(bind_addr).await
    }

    /// Starting → Open after a failed spawn. Members stay, ready flags
    /// are cleared and everyone gets `SpawnFailed`.
    pub async fn revert_to_open(
        &self,
        room_id: RoomId,
        reason: String,
    ) -> Result<(), RoomError> {
        let handle = self.handle(room_id)?;
        let result = handle.revert_to_open(reason).await;
        let mut index = self.index();
        if index.forget_if_gone(room_id, result)? {
            index.forget(room_id);
        }
        Ok(())
    }

    /// Delivers each member's game-server token.
    pub async fn announce_start(
        &self,
        room_id: RoomId,
        tokens: Vec<(PlayerId, String)>,
    ) -> Result<usize, RoomError> {
        self.handle(room_id)?.announce_start(tokens).await
    }

    /// Closes a room in any state and forgets it.
    pub async fn close(&self, room_id: RoomId, reason: String) -> Result<(), RoomError> {
        let handle = self.handle(room_id)?;
        // An actor that already stopped is as closed as it gets.
        let _ = handle.close(reason).await;
        self.forget(room_id);
        Ok(())
    }

    /// Closes every room. Used on shutdown.
    pub async fn close_all(&self, reason: &str) {
        let ids: Vec<RoomId> = self.index().rooms.keys().copied().collect();
        for room_id in ids {
            let _ = self.close(room_id, reason.to_string()).await;
        }
    }

    /// Drops a room and every index entry pointing at it. Idempotent.
    pub fn forget(&self, room_id: RoomId) {
        self.index().forget(room_id);
    }

    /// Returns the room a player is currently in, if any.
    pub fn player_room(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.index().player_rooms.get(player_id).copied()
    }

    pub fn room_count(&self) -> usize {
        self.index().rooms.len()
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.index().rooms.contains_key(&room_id)
    }

    fn handle(&self, room_id: RoomId) -> Result<RoomHandle, RoomError> {
        self.index().handle(room_id)
    }

    /// Critical sections never await. A poisoned lock still guards a
    /// usable index.
    fn index(&self) -> MutexGuard<'_, Index> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
