//! Messages exchanged between clients and the lobby.
//!
//! Both directions are closed, internally tagged enums:
//! `{ "type": "JoinRoom", "room": "AB12CD" }`. An unknown `type` fails
//! to decode, and the lobby treats that as a protocol violation.

use serde::{Deserialize, Serialize};

use crate::{ErrorCode, GameId, PlayerId, RoomId, RoomSnapshot, RoomSummary};

/// Identifies the room a player wants to join.
///
/// Untagged: a number is a room id, a string is a six-character room code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomRef {
    Id(RoomId),
    Code(String),
}

/// Client → lobby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyRequest {
    /// Log in. Must be the first request on a connection (besides `Ping`).
    Authenticate {
        username: String,
        password_hash: String,
    },

    /// Create a room for a published game and join it as owner.
    ///
    /// Player bounds default to the game's catalog bounds and are clamped
    /// into them when given.
    CreateRoom {
        game_id: GameId,
        #[serde(default)]
        min_players: Option<usize>,
        #[serde(default)]
        max_players: Option<usize>,
        /// Game-specific settings handed to the game server unchanged.
        #[serde(default)]
        config: serde_json::Value,
    },

    JoinRoom { room: RoomRef },

    SetReady { ready: bool },

    LeaveRoom,

    /// List rooms, optionally only those of one game.
    ListRooms {
        #[serde(default)]
        game_id: Option<GameId>,
    },

    /// Invite an online player to the room the sender owns.
    Invite { player_id: PlayerId },

    /// Pending invites addressed to the sender.
    ListInvites,

    /// Join the room an invite points at.
    AcceptInvite { room_id: RoomId },

    /// Everyone logged in, with what they are doing.
    ListActivePlayers,

    /// End the session but keep the connection. Leaves the current room.
    Logout,

    Ping,
}

/// A pending invite as shown to its recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteView {
    pub room_id: RoomId,
    pub code: String,
    pub game_id: GameId,
    pub from: PlayerId,
    pub from_name: String,
}

/// What a logged-in player is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    Idle,
    InRoom,
    InGame,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePlayer {
    pub player_id: PlayerId,
    pub username: String,
    pub status: PlayerStatus,
}

/// Lobby → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyEvent {
    Authenticated {
        player_id: PlayerId,
        username: String,
    },

    /// Sent to every member after any change to their room.
    RoomState { room: RoomSnapshot },

    RoomList { rooms: Vec<RoomSummary> },

    /// The room's game server is up. Connect to `bind_addr` and present
    /// `token` in the handshake.
    RoomStarted {
        room_id: RoomId,
        bind_addr: String,
        token: String,
    },

    /// Starting the game server failed; the room is open again with the
    /// same members and everyone marked not ready.
    SpawnFailed { room_id: RoomId, reason: String },

    /// Confirms that the receiver left the room.
    LeftRoom { room_id: RoomId },

    RoomClosed { room_id: RoomId, reason: String },

    /// Confirms an invite to its sender.
    InviteSent { room_id: RoomId, player_id: PlayerId },

    /// Pushed to the invited player.
    InviteReceived { invite: InviteView },

    InviteList { invites: Vec<InviteView> },

    /// Ordered by player id.
    ActivePlayers { players: Vec<ActivePlayer> },

    LoggedOut,

    Pong,

    Error { code: ErrorCode, message: String },
}

impl LobbyEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_room_by_code_json_format() {
        let msg: LobbyRequest =
            serde_json::from_str(r#"{"type":"JoinRoom","room":"AB12CD"}"#)
                .unwrap();
        assert_eq!(
            msg,
            LobbyRequest::JoinRoom {
                room: RoomRef::Code("AB12CD".into())
            }
        );
    }

    #[test]
    fn test_join_room_by_id_json_format() {
        let msg: LobbyRequest =
            serde_json::from_str(r#"{"type":"JoinRoom","room":17}"#).unwrap();
        assert_eq!(
            msg,
            LobbyRequest::JoinRoom {
                room: RoomRef::Id(RoomId(17))
            }
        );
    }

    #[test]
    fn test_create_room_optional_fields_default() {
        let msg: LobbyRequest =
            serde_json::from_str(r#"{"type":"CreateRoom","game_id":"rps"}"#)
                .unwrap();
        match msg {
            LobbyRequest::CreateRoom {
                game_id,
                min_players,
                max_players,
                config,
            } => {
                assert_eq!(game_id, GameId::from("rps"));
                assert_eq!(min_players, None);
                assert_eq!(max_players, None);
                assert!(config.is_null());
            }
            other => panic!("expected CreateRoom, got {other:?}"),
        }
    }

    #[test]
    fn test_unit_variants_are_bare_tags() {
        let json = serde_json::to_value(&LobbyRequest::LeaveRoom).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "LeaveRoom" }));
    }

    #[test]
    fn test_accept_invite_json_format() {
        let msg: LobbyRequest =
            serde_json::from_str(r#"{"type":"AcceptInvite","room_id":4}"#)
                .unwrap();
        assert_eq!(msg, LobbyRequest::AcceptInvite { room_id: RoomId(4) });
    }

    #[test]
    fn test_active_players_status_is_snake_case() {
        let json = serde_json::to_value(LobbyEvent::ActivePlayers {
            players: vec![ActivePlayer {
                player_id: PlayerId(2),
                username: "bob".into(),
                status: PlayerStatus::InGame,
            }],
        })
        .unwrap();
        assert_eq!(json["type"], "ActivePlayers");
        assert_eq!(json["players"][0]["status"], "in_game");
    }

    #[test]
    fn test_unknown_type_fails_to_decode() {
        let result: Result<LobbyRequest, _> =
            serde_json::from_str(r#"{"type":"Teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_error_event_json_format() {
        let json = serde_json::to_value(LobbyEvent::error(
            ErrorCode::RoomFull,
            "room R-1 is full",
        ))
        .unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], "room_full");
        assert_eq!(json["message"], "room R-1 is full");
    }
}
