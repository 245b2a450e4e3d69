//! Per-connection handler: login and lobby request routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `Authenticate` within the login timeout → create session
//!   2. Loop: receive requests → dispatch to the room registry
//!   3. `Logout` ends the session and goes back to step 1 on the same
//!      connection
//!
//! Room events reach the player through an unbounded queue drained by a
//! writer task, so a slow client never holds up its room.

use std::collections::HashMap;
use std::sync::Arc;

use parlor_protocol::{
    ActivePlayer, Codec, ErrorCode, InviteView, LobbyEvent, LobbyRequest,
    PlayerId, PlayerStatus, RoomId, RoomRef, RoomState,
};
use parlor_room::{CreateRoom, PlayerSender, RoomError};
use parlor_session::{Identity, SessionError};
use parlor_transport::{Connection, TcpConnection};
use parlor_turns::{EngineError, rules_for};
use tokio::sync::mpsc;

use crate::config::{clamp_bounds, merge_config};
use crate::server::ServerState;
use crate::{Catalog, ParlorError};

/// Drop guard that ends a player's session when the handler exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async locks.
struct SessionGuard<C: Catalog> {
    player_id: PlayerId,
    state: Arc<ServerState<C>>,
    armed: bool,
}

impl<C: Catalog> SessionGuard<C> {
    fn new(player_id: PlayerId, state: Arc<ServerState<C>>) -> Self {
        Self {
            player_id,
            state,
            armed: true,
        }
    }

    /// Ends the session now, before the next request is read.
    async fn release(mut self) {
        self.armed = false;
        end_session(&self.state, self.player_id).await;
    }
}

impl<C: Catalog> Drop for SessionGuard<C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let player_id = self.player_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            end_session(&state, player_id).await;
        });
    }
}

/// Leaves the player's room, drops their invites and inbox, then the
/// session itself. The session goes last so a new login for the account
/// only succeeds once everything else is gone.
async fn end_session<C: Catalog>(state: &ServerState<C>, player_id: PlayerId) {
    if let Some(room_id) = state.rooms.player_room(&player_id) {
        if let Err(e) = state.rooms.leave_room(room_id, player_id).await {
            tracing::debug!(%player_id, error = %e, "leave on session end failed");
        }
    }
    state.invites.lock().await.forget_player(player_id);
    state.inboxes.lock().await.remove(&player_id);
    let mut sessions = state.sessions.lock().await;
    let _ = sessions.remove(player_id);
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Catalog>(
    conn: TcpConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), ParlorError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_events(Arc::clone(&conn), state.codec, rx));

    let mut identity: Option<Identity> = None;
    let mut guard: Option<SessionGuard<C>> = None;

    loop {
        let limit = if identity.is_some() {
            state.config.recv_timeout
        } else {
            state.config.login_timeout
        };
        let data = match tokio::time::timeout(limit, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(%conn_id, "connection timed out");
                send_error(&conn, &state, ErrorCode::Timeout, "timed out").await;
                break;
            }
        };

        let request: LobbyRequest = match state.codec.decode(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "failed to decode request");
                send_error(&conn, &state, ErrorCode::ProtocolViolation, &e.to_string())
                    .await;
                break;
            }
        };

        let result = match request {
            LobbyRequest::Ping => Ok(Some(LobbyEvent::Pong)),
            LobbyRequest::Authenticate {
                username,
                password_hash,
            } => {
                if let Some(player_id) = identity.as_ref().map(|w| w.player_id) {
                    Err(SessionError::AlreadyConnected(player_id).into())
                } else {
                    match login(&state, &username, &password_hash, &tx).await {
                        Ok(who) => {
                            tracing::info!(%conn_id, player_id = %who.player_id, "player authenticated");
                            guard = Some(SessionGuard::new(who.player_id, Arc::clone(&state)));
                            let event = LobbyEvent::Authenticated {
                                player_id: who.player_id,
                                username: who.username.clone(),
                            };
                            identity = Some(who);
                            Ok(Some(event))
                        }
                        Err(e) => Err(e),
                    }
                }
            }
            LobbyRequest::Logout => match (identity.take(), guard.take()) {
                (Some(who), Some(session)) => {
                    session.release().await;
                    tracing::info!(%conn_id, player_id = %who.player_id, "player logged out");
                    Ok(Some(LobbyEvent::LoggedOut))
                }
                _ => Err(ParlorError::NotAuthenticated),
            },
            request => match &identity {
                Some(who) => dispatch(&state, who, &tx, request).await,
                None => Err(ParlorError::NotAuthenticated),
            },
        };

        match result {
            Ok(Some(event)) => {
                let _ = tx.send(event);
            }
            Ok(None) => {}
            Err(e) => {
                let code = e.code();
                tracing::debug!(%conn_id, %code, error = %e, "request rejected");
                if code.closes_connection() {
                    send_error(&conn, &state, code, &e.to_string()).await;
                    break;
                }
                let _ = tx.send(LobbyEvent::error(code, e.to_string()));
            }
        }
    }

    writer.abort();
    let _ = conn.close().await;
    // Membership and session cleanup fires here.
    drop(guard);
    Ok(())
}

async fn login<C: Catalog>(
    state: &ServerState<C>,
    username: &str,
    password_hash: &str,
    tx: &PlayerSender,
) -> Result<Identity, ParlorError> {
    let identity = state.catalog.authenticate(username, password_hash).await?;
    {
        let mut sessions = state.sessions.lock().await;
        sessions.create(identity.clone())?;
    }
    state
        .inboxes
        .lock()
        .await
        .insert(identity.player_id, tx.clone());
    Ok(identity)
}

/// Routes one request from a logged-in player. Returns the direct reply,
/// if the request has one; room changes arrive as broadcasts.
async fn dispatch<C: Catalog>(
    state: &ServerState<C>,
    who: &Identity,
    tx: &PlayerSender,
    request: LobbyRequest,
) -> Result<Option<LobbyEvent>, ParlorError> {
    let player_id = who.player_id;
    match request {
        LobbyRequest::CreateRoom {
            game_id,
            min_players,
            max_players,
            config,
        } => {
            let game = state
                .catalog
                .game(&game_id)
                .await?
                .filter(|g| g.published)
                .ok_or_else(|| ParlorError::GameNotFound(game_id.clone()))?;
            let (min_players, max_players) = clamp_bounds(
                min_players,
                max_players,
                game.min_players,
                game.max_players,
            );
            let config = merge_config(&game.config, config);
            rules_for(&game_id, &config).map_err(|e| match e {
                EngineError::UnknownGame(id) => ParlorError::GameNotFound(id),
                other => ParlorError::InvalidConfig(other.to_string()),
            })?;

            // The new room's first snapshot is the owner's reply.
            state.rooms.create_room(
                CreateRoom {
                    game_id,
                    owner: player_id,
                    owner_name: who.username.clone(),
                    min_players,
                    max_players,
                    config,
                },
                tx.clone(),
            )?;
            Ok(None)
        }

        LobbyRequest::JoinRoom { room } => {
            let room_id = state.rooms.resolve(&room)?;
            state
                .rooms
                .join_room(room_id, player_id, who.username.clone(), tx.clone())
                .await?;
            if let RoomRef::Code(code) = room {
                tracing::debug!(%player_id, %code, %room_id, "joined by code");
            }
            Ok(None)
        }

        LobbyRequest::SetReady { ready } => {
            let room_id = current_room(state, player_id)?;
            state.rooms.set_ready(room_id, player_id, ready).await?;
            Ok(None)
        }

        LobbyRequest::LeaveRoom => {
            let room_id = current_room(state, player_id)?;
            state.rooms.leave_room(room_id, player_id).await?;
            Ok(None)
        }

        LobbyRequest::ListRooms { game_id } => {
            let rooms = state.rooms.list_rooms(game_id.as_ref()).await;
            Ok(Some(LobbyEvent::RoomList { rooms }))
        }

        LobbyRequest::Invite { player_id: to } => invite(state, who, to).await,

        LobbyRequest::ListInvites => {
            let invites = state.invites.lock().await.for_player(player_id);
            // The close event that prunes invites may still be queued.
            let invites = invites
                .into_iter()
                .filter(|i| state.rooms.contains(i.room_id))
                .collect();
            Ok(Some(LobbyEvent::InviteList { invites }))
        }

        LobbyRequest::AcceptInvite { room_id } => {
            if !state.invites.lock().await.contains(player_id, room_id) {
                return Err(ParlorError::InviteNotFound(room_id));
            }
            let result = state
                .rooms
                .join_room(room_id, player_id, who.username.clone(), tx.clone())
                .await;
            // A full or started room may open up again; a gone one won't.
            if matches!(result, Ok(_) | Err(RoomError::NotFound(_))) {
                state.invites.lock().await.remove(player_id, room_id);
            }
            result?;
            tracing::info!(%player_id, %room_id, "invite accepted");
            Ok(None)
        }

        LobbyRequest::ListActivePlayers => Ok(Some(LobbyEvent::ActivePlayers {
            players: active_players(state).await,
        })),

        // Handled before dispatch.
        LobbyRequest::Authenticate { .. }
        | LobbyRequest::Logout
        | LobbyRequest::Ping => Ok(None),
    }
}

fn current_room<C: Catalog>(
    state: &ServerState<C>,
    player_id: PlayerId,
) -> Result<RoomId, ParlorError> {
    state
        .rooms
        .player_room(&player_id)
        .ok_or(ParlorError::NoRoom(player_id))
}

/// Invites `to` into the room `who` owns. The room must be open with a
/// free seat and `to` must be online and not already a member.
async fn invite<C: Catalog>(
    state: &ServerState<C>,
    who: &Identity,
    to: PlayerId,
) -> Result<Option<LobbyEvent>, ParlorError> {
    let player_id = who.player_id;
    if to == player_id {
        return Err(ParlorError::SelfInvite);
    }
    if !state.sessions.lock().await.is_online(&to) {
        return Err(ParlorError::PlayerOffline(to));
    }

    let room_id = current_room(state, player_id)?;
    let room = state.rooms.snapshot(room_id).await?;
    if room.owner != player_id {
        return Err(ParlorError::NotRoomOwner(room_id));
    }
    if !room.state.is_open() {
        return Err(RoomError::NotOpen(room_id, room.state).into());
    }
    if room.members.len() >= room.max_players {
        return Err(RoomError::RoomFull(room_id).into());
    }
    if room.members.iter().any(|m| m.player_id == to) {
        return Err(RoomError::AlreadyInRoom(to, room_id).into());
    }

    let invite = InviteView {
        room_id,
        code: room.code,
        game_id: room.game_id,
        from: player_id,
        from_name: who.username.clone(),
    };
    state.invites.lock().await.add(to, invite.clone());
    let inbox = state.inboxes.lock().await.get(&to).cloned();
    if let Some(inbox) = inbox {
        let _ = inbox.send(LobbyEvent::InviteReceived { invite });
    }
    tracing::info!(%player_id, %to, %room_id, "invite sent");
    Ok(Some(LobbyEvent::InviteSent {
        room_id,
        player_id: to,
    }))
}

/// Everyone logged in, ordered by player id. Players in a starting or
/// running room count as in game.
async fn active_players<C: Catalog>(state: &ServerState<C>) -> Vec<ActivePlayer> {
    let mut online: Vec<(PlayerId, String)> = {
        let sessions = state.sessions.lock().await;
        sessions
            .iter()
            .map(|s| (s.player_id, s.username.clone()))
            .collect()
    };
    online.sort_by_key(|(id, _)| *id);

    let mut room_states: HashMap<RoomId, Option<RoomState>> = HashMap::new();
    let mut players = Vec::with_capacity(online.len());
    for (player_id, username) in online {
        let room_state = match state.rooms.player_room(&player_id) {
            Some(room_id) => {
                if !room_states.contains_key(&room_id) {
                    let snapshot = state.rooms.snapshot(room_id).await;
                    room_states.insert(room_id, snapshot.ok().map(|r| r.state));
                }
                room_states.get(&room_id).copied().flatten()
            }
            None => None,
        };
        let status = match room_state {
            Some(s) if s.is_active() => PlayerStatus::InGame,
            Some(_) => PlayerStatus::InRoom,
            None => PlayerStatus::Idle,
        };
        players.push(ActivePlayer {
            player_id,
            username,
            status,
        });
    }
    players
}

/// Drains the player's event queue onto the socket.
async fn write_events(
    conn: Arc<TcpConnection>,
    codec: parlor_protocol::JsonCodec,
    mut events: mpsc::UnboundedReceiver<LobbyEvent>,
) {
    while let Some(event) = events.recv().await {
        let bytes = match codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode lobby event");
                continue;
            }
        };
        if conn.send(&bytes).await.is_err() {
            break;
        }
    }
}

/// Sends an error straight to the socket, ahead of anything queued.
async fn send_error<C: Catalog>(
    conn: &TcpConnection,
    state: &ServerState<C>,
    code: ErrorCode,
    message: &str,
) {
    if let Ok(bytes) = state.codec.encode(&LobbyEvent::error(code, message)) {
        let _ = conn.send(&bytes).await;
    }
}
