//! Messages exchanged between clients and a room's game server.

use serde::{Deserialize, Serialize};

use crate::{
    Action, CompletionStatus, ErrorCode, GameId, PlayerId, RankEntry, RoomId,
    ScoreEntry,
};

/// Phase of the turn synchronization state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Waiting,
    RoundActive,
    Resolving,
    Finished,
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::RoundActive => write!(f, "round_active"),
            Self::Resolving => write!(f, "resolving"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// A player as listed in the game server's welcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub display_name: String,
}

/// The action a player used in a resolved round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub player_id: PlayerId,
    pub action: Action,
    /// `true` if the player did not submit and the default was used.
    pub defaulted: bool,
}

/// Outcome of one unordered pairing in a pairwise-comparison round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairOutcome {
    pub a: PlayerId,
    pub b: PlayerId,
    /// `None` for a tie.
    pub winner: Option<PlayerId>,
}

/// Client → game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameRequest {
    /// Must be the first message on the connection.
    Handshake { token: String },

    Ready,

    /// `round` is the round the client believes is active. Submissions
    /// for any other round are dropped as stale.
    SubmitAction { round: u32, action: Action },
}

/// Game server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    Welcome {
        player_id: PlayerId,
        room_id: RoomId,
        game_id: GameId,
        players: Vec<PlayerInfo>,
        total_rounds: u32,
        deadline_ms: u64,
    },

    StateSnapshot {
        phase: MatchPhase,
        round: u32,
        connected: Vec<PlayerId>,
        scores: Vec<ScoreEntry>,
    },

    RoundStart { round: u32, deadline_ms: u64 },

    RoundResult {
        round: u32,
        actions: Vec<PlayerAction>,
        pairings: Vec<PairOutcome>,
        deltas: Vec<ScoreEntry>,
        totals: Vec<ScoreEntry>,
    },

    MatchOver {
        status: CompletionStatus,
        rounds_played: u32,
        scores: Vec<ScoreEntry>,
        ranking: Vec<RankEntry>,
    },

    PlayerLeft { player_id: PlayerId },

    Error { code: ErrorCode, message: String },
}

impl GameEvent {
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
    fn test_submit_action_json_format() {
        let msg = GameRequest::SubmitAction {
            round: 2,
            action: Action::from("paper"),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "type": "SubmitAction", "round": 2, "action": "paper" })
        );
    }

    #[test]
    fn test_handshake_decodes() {
        let msg: GameRequest =
            serde_json::from_str(r#"{"type":"Handshake","token":"abc.def"}"#)
                .unwrap();
        assert_eq!(
            msg,
            GameRequest::Handshake {
                token: "abc.def".into()
            }
        );
    }

    #[test]
    fn test_round_start_json_format() {
        let json = serde_json::to_value(GameEvent::RoundStart {
            round: 1,
            deadline_ms: 15_000,
        })
        .unwrap();
        assert_eq!(json["type"], "RoundStart");
        assert_eq!(json["deadline_ms"], 15_000);
    }

    #[test]
    fn test_match_over_carries_status_and_ranking() {
        let event = GameEvent::MatchOver {
            status: CompletionStatus::Aborted,
            rounds_played: 2,
            scores: vec![],
            ranking: vec![RankEntry {
                rank: 1,
                player_id: PlayerId(4),
                score: 3,
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "aborted");
        assert_eq!(json["ranking"][0]["player_id"], 4);
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&MatchPhase::RoundActive).unwrap(),
            "\"round_active\""
        );
    }
}
