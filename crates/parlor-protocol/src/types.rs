//! Shared value types that appear in more than one protocol.
//!
//! Identity newtypes, the error code vocabulary, room views, and the
//! score/ranking records exchanged between the game server, the
//! supervisor, and the lobby.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player account.
///
/// Assigned by the account store; the core only carries it around.
/// `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a room.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// Identifies a hosted game in the catalog, e.g. `"rps"`.
///
/// The game id also selects the rule plugin a game server runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An opaque player action, interpreted only by the game's rule set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(pub String);

impl Action {
    pub fn new(action: impl Into<String>) -> Self {
        Self(action.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Action {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable reason attached to every rejected operation.
///
/// Clients branch on the code; the accompanying message is for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // -- Authentication --
    AuthFailed,
    NotAuthenticated,
    PlayerOffline,
    AlreadyLoggedIn,
    TokenExpired,
    TokenUnknown,
    TokenRevoked,

    // -- Capacity / room lifecycle --
    GameNotFound,
    RoomFull,
    RoomNotOpen,
    RoomNotFound,
    NotInRoom,
    AlreadyInRoom,
    NotRoomOwner,
    InviteNotFound,
    BelowMinimum,

    // -- Match --
    InvalidAction,
    LateSubmission,
    StaleRound,
    MatchNotActive,

    // -- Faults --
    /// Well-formed message with unacceptable arguments.
    InvalidRequest,
    ProtocolViolation,
    SpawnFailed,
    Timeout,
    Unavailable,
    Internal,
}

impl ErrorCode {
    /// Authentication failures close the connection instead of letting
    /// the client retry on the same socket.
    pub fn closes_connection(self) -> bool {
        matches!(
            self,
            Self::AuthFailed
                | Self::TokenExpired
                | Self::TokenUnknown
                | Self::TokenRevoked
                | Self::ProtocolViolation
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde spelling so logs match the wire.
        let text = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{self:?}"));
        f.write_str(&text)
    }
}

// ---------------------------------------------------------------------------
// Room views
// ---------------------------------------------------------------------------

/// The lifecycle state of a room.
///
/// ```text
/// Open ──(all ready)──→ Starting ──(process ready)──→ InProgress ──→ Closed
///   ↑                      │
///   └──(spawn failure)─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    Open,
    Starting,
    InProgress,
    Closed,
}

impl RoomState {
    /// Returns `true` if the room is accepting joins and ready changes.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` while a game process is being started or running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::InProgress)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Starting => write!(f, "starting"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// One member as shown to the other members of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub ready: bool,
}

/// Full view of a room, broadcast to its members after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    /// Six-character code players can share to join.
    pub code: String,
    pub game_id: GameId,
    pub owner: PlayerId,
    pub state: RoomState,
    pub min_players: usize,
    pub max_players: usize,
    /// Members in join order.
    pub members: Vec<MemberView>,
}

/// A short summary of a room returned by room listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub code: String,
    pub game_id: GameId,
    pub state: RoomState,
    pub player_count: usize,
    pub min_players: usize,
    pub max_players: usize,
}

// ---------------------------------------------------------------------------
// Scores and ranking
// ---------------------------------------------------------------------------

/// A player's score. Lists of these are always kept in join order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub player_id: PlayerId,
    pub score: i64,
}

/// A player's final placing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    /// 1-based placing. Ranks are unique; ties are broken by join order.
    pub rank: usize,
    pub player_id: PlayerId,
    pub score: i64,
}

impl RankEntry {
    /// Ranks players by score, highest first.
    ///
    /// `scores` must be in join order: the sort is stable, so players
    /// with equal scores keep their join order.
    pub fn rank(scores: &[ScoreEntry]) -> Vec<RankEntry> {
        let mut ordered = scores.to_vec();
        ordered.sort_by(|a, b| b.score.cmp(&a.score));
        ordered
            .into_iter()
            .enumerate()
            .map(|(i, s)| RankEntry {
                rank: i + 1,
                player_id: s.player_id,
                score: s.score,
            })
            .collect()
    }
}

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// All configured rounds were played.
    Completed,
    /// The match ended early (players left, start timeout, shutdown).
    Aborted,
    /// The game-server process died without reporting a result.
    Crashed,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}
