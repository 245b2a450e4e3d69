//! Error types for the session layer.

use parlor_protocol::{ErrorCode, PlayerId, RoomId};

/// Errors from login and login-session bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The [`Authenticator`](crate::Authenticator) rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The credential backend could not be reached.
    #[error("authentication backend unavailable: {0}")]
    Backend(String),

    /// No session exists for the given player.
    #[error("session not found for player {0}")]
    NotFound(PlayerId),

    /// The account is already logged in on another connection.
    #[error("player {0} already has an active session")]
    AlreadyConnected(PlayerId),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AuthFailed(_) => ErrorCode::AuthFailed,
            Self::Backend(_) => ErrorCode::Unavailable,
            Self::NotFound(_) => ErrorCode::NotAuthenticated,
            Self::AlreadyConnected(_) => ErrorCode::AlreadyLoggedIn,
        }
    }
}

/// Errors from issuing or validating room tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token's lifetime elapsed before it was used.
    #[error("token expired")]
    Expired,

    /// The token is malformed, forged, or was signed for another room.
    #[error("unknown token")]
    Unknown,

    /// The token was already used, superseded by a newer token for the
    /// same player, or revoked when its room closed.
    #[error("token revoked")]
    Revoked,

    /// Tokens can only be issued for a room with a registered key.
    #[error("no signing key registered for room {0}")]
    RoomNotRegistered(RoomId),

    /// A handed-off signing key could not be parsed.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

impl TokenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Expired => ErrorCode::TokenExpired,
            Self::Unknown => ErrorCode::TokenUnknown,
            Self::Revoked => ErrorCode::TokenRevoked,
            Self::RoomNotRegistered(_) | Self::InvalidKey(_) => {
                ErrorCode::Internal
            }
        }
    }
}
