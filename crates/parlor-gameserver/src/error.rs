//! Error type for the game server.

use parlor_protocol::{ErrorCode, ProtocolError};
use parlor_session::TokenError;
use parlor_transport::TransportError;
use parlor_turns::EngineError;

/// Everything that can go wrong inside a game-server process.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A handshake token was rejected.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The match refused an input.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The match is over and no longer takes input.
    #[error("match is closed")]
    MatchClosed,

    /// The match task panicked or was cancelled.
    #[error("match task failed: {0}")]
    MatchLost(String),
}

impl GameServerError {
    /// The code sent to the client that caused this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Token(e) => e.code(),
            Self::Engine(e) => e.code(),
            Self::Protocol(_) => ErrorCode::ProtocolViolation,
            Self::MatchClosed => ErrorCode::MatchNotActive,
            Self::Transport(_) | Self::MatchLost(_) => ErrorCode::Internal,
        }
    }
}
