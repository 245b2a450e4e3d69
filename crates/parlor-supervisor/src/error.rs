//! Error types for the supervisor.

use std::time::Duration;

use parlor_protocol::{ErrorCode, ProtocolError, RoomId};

/// Errors from launching or waiting on a game-server process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A process for this room is still alive.
    #[error("room {0} already has a running game server")]
    AlreadyRunning(RoomId),

    #[error("handoff context rejected: {0}")]
    Handoff(#[from] ProtocolError),

    #[error("failed to start game server: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("game server not ready after {0:?}")]
    Timeout(Duration),

    /// The process exited before it reported ready.
    #[error("game server exited before ready (code {code:?})")]
    CrashedBeforeReady { code: Option<i32> },

    /// The monitor task went away without producing a report.
    #[error("lost track of the game server for room {0}")]
    MonitorLost(RoomId),
}

impl SupervisorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::AlreadyRunning(_) | Self::MonitorLost(_) => ErrorCode::Internal,
            Self::Handoff(_)
            | Self::SpawnFailed(_)
            | Self::CrashedBeforeReady { .. } => ErrorCode::SpawnFailed,
        }
    }
}
