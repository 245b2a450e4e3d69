//! Error types for the room layer.

use parlor_protocol::{ErrorCode, PlayerId, RoomId, RoomState};

/// Errors that can occur during room operations.
///
/// A rejected operation never changes the room.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    #[error("no room with code {0}")]
    CodeNotFound(String),

    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// Joins and ready changes are only accepted while the room is open.
    #[error("room {0} is {1}, not open")]
    NotOpen(RoomId, RoomState),

    #[error("player {0} already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    #[error("player {0} not in room {1}")]
    NotInRoom(PlayerId, RoomId),

    #[error("invalid player bounds: min {min}, max {max}")]
    InvalidBounds { min: usize, max: usize },

    /// A lifecycle transition was requested from the wrong state.
    #[error("room {0}: {1}")]
    InvalidState(RoomId, String),

    /// The room's actor has stopped.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::CodeNotFound(_) | Self::Unavailable(_) => {
                ErrorCode::RoomNotFound
            }
            Self::RoomFull(_) => ErrorCode::RoomFull,
            Self::NotOpen(..) => ErrorCode::RoomNotOpen,
            Self::AlreadyInRoom(..) => ErrorCode::AlreadyInRoom,
            Self::NotInRoom(..) => ErrorCode::NotInRoom,
            Self::InvalidBounds { .. } => ErrorCode::InvalidRequest,
            Self::InvalidState(..) => ErrorCode::Internal,
        }
    }
}
