//! Errors from the match engine.

use parlor_protocol::{ErrorCode, GameId, MatchPhase, PlayerId};

/// Why the engine refused an input.
///
/// None of these change match state; the caller answers the player with
/// [`EngineError::code`]. Codes that close the connection
/// ([`ErrorCode::closes_connection`]) also drop the player's connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("{0} is not a member of this match")]
    NotMember(PlayerId),

    #[error("{0} is already connected")]
    AlreadyConnected(PlayerId),

    #[error("{0} has forfeited the match")]
    Forfeited(PlayerId),

    /// The message is not valid in the current phase.
    #[error("message not valid while the match is {0}")]
    WrongPhase(MatchPhase),

    #[error("submission for round {submitted} but round {current} is active")]
    StaleRound { submitted: u32, current: u32 },

    #[error("{0} already submitted an action this round")]
    AlreadySubmitted(PlayerId),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("no rules for game {0}")]
    UnknownGame(GameId),

    #[error("invalid game config: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotMember(_) => ErrorCode::NotInRoom,
            Self::AlreadyConnected(_) | Self::WrongPhase(_) => {
                ErrorCode::ProtocolViolation
            }
            Self::Forfeited(_) => ErrorCode::MatchNotActive,
            Self::StaleRound { .. } => ErrorCode::StaleRound,
            Self::AlreadySubmitted(_) => ErrorCode::LateSubmission,
            Self::InvalidAction(_) => ErrorCode::InvalidAction,
            Self::UnknownGame(_) => ErrorCode::GameNotFound,
            Self::InvalidConfig(_) => ErrorCode::Internal,
        }
    }
}
