//! Unified error type for the lobby.

use parlor_protocol::{ErrorCode, GameId, PlayerId, ProtocolError, RoomId};
use parlor_room::RoomError;
use parlor_session::{SessionError, TokenError};
use parlor_supervisor::SupervisorError;
use parlor_transport::TransportError;

use crate::CatalogError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapped variant generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically. Every
/// variant maps to the [`ErrorCode`] the client sees.
#[derive(Debug, thiserror::Error)]
pub enum ParlorError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A login error (bad credentials, duplicate login, store down).
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Token(#[from] TokenError),

    /// A room-level error (full, not found, not open).
    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The request needs a logged-in session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The game does not exist or is not published.
    #[error("game {0} not found")]
    GameNotFound(GameId),

    /// The room's game config was rejected by the game's rules.
    #[error("invalid game config: {0}")]
    InvalidConfig(String),

    /// The player is not in any room.
    #[error("player {0} is not in a room")]
    NoRoom(PlayerId),

    /// Only a room's owner may invite.
    #[error("only the owner of room {0} can invite")]
    NotRoomOwner(RoomId),

    #[error("player {0} is not online")]
    PlayerOffline(PlayerId),

    #[error("cannot invite yourself")]
    SelfInvite,

    #[error("no pending invite to room {0}")]
    InviteNotFound(RoomId),
}

impl ParlorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::Internal,
            Self::Protocol(_) => ErrorCode::ProtocolViolation,
            Self::Session(e) => e.code(),
            Self::Token(e) => e.code(),
            Self::Room(e) => e.code(),
            Self::Supervisor(e) => e.code(),
            Self::Catalog(e) => e.code(),
            Self::NotAuthenticated => ErrorCode::NotAuthenticated,
            Self::GameNotFound(_) => ErrorCode::GameNotFound,
            Self::InvalidConfig(_) => ErrorCode::InvalidRequest,
            Self::NoRoom(_) => ErrorCode::NotInRoom,
            Self::NotRoomOwner(_) => ErrorCode::NotRoomOwner,
            Self::PlayerOffline(_) => ErrorCode::PlayerOffline,
            Self::SelfInvite => ErrorCode::InvalidRequest,
            Self::InviteNotFound(_) => ErrorCode::InviteNotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let parlor_err: ParlorError = err.into();
        assert!(matches!(parlor_err, ParlorError::Transport(_)));
        assert!(parlor_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error_is_protocol_violation() {
        let err: ParlorError =
            ProtocolError::InvalidMessage("bad".into()).into();
        assert!(matches!(err, ParlorError::Protocol(_)));
        assert_eq!(err.code(), ErrorCode::ProtocolViolation);
    }

    #[test]
    fn test_from_session_error_keeps_auth_code() {
        let err: ParlorError = SessionError::AuthFailed("nope".into()).into();
        assert_eq!(err.code(), ErrorCode::AuthFailed);
        assert!(err.code().closes_connection());
    }

    #[test]
    fn test_from_room_error_keeps_capacity_code() {
        let err: ParlorError = RoomError::RoomFull(RoomId(1)).into();
        assert!(matches!(err, ParlorError::Room(_)));
        assert_eq!(err.code(), ErrorCode::RoomFull);
        assert!(!err.code().closes_connection());
    }

    #[test]
    fn test_lobby_specific_codes() {
        assert_eq!(
            ParlorError::NotAuthenticated.code(),
            ErrorCode::NotAuthenticated
        );
        assert_eq!(
            ParlorError::GameNotFound(GameId::from("chess")).code(),
            ErrorCode::GameNotFound
        );
        assert_eq!(ParlorError::NoRoom(PlayerId(1)).code(), ErrorCode::NotInRoom);
        assert_eq!(
            ParlorError::NotRoomOwner(RoomId(3)).code(),
            ErrorCode::NotRoomOwner
        );
        assert!(!ParlorError::PlayerOffline(PlayerId(4)).code().closes_connection());
    }
}
