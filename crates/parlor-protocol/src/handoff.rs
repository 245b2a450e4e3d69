//! Supervisor ↔ game-server process contract.
//!
//! Going in, the supervisor serializes a [`HandoffContext`] into a single
//! environment variable ([`HANDOFF_ENV`]). The child parses it once at
//! startup and never looks at its environment again.
//!
//! Coming back, the child writes framed [`ProcessReport`]s to its stdout:
//! `Ready` once it is listening, `Progress` after every round, and
//! `Finished` with the final [`ExitReport`].

use serde::{Deserialize, Serialize};

use crate::{
    CompletionStatus, GameId, PlayerId, ProtocolError, RankEntry, RoomId,
    ScoreEntry,
};

/// Environment variable carrying the JSON-encoded [`HandoffContext`].
pub const HANDOFF_ENV: &str = "PARLOR_HANDOFF";

/// What, besides everyone being connected, starts the first round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Every connected player must send `Ready`.
    #[default]
    AllReady,
    /// Start as soon as every expected player has connected. The lobby
    /// already collected readiness before spawning.
    OnConnect,
}

/// A room member as handed to the game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffMember {
    pub player_id: PlayerId,
    pub display_name: String,
}

/// Everything a game-server process knows about its room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffContext {
    pub room_id: RoomId,
    pub game_id: GameId,
    /// Hex-encoded key that room tokens for this process are signed with.
    pub token_key: String,
    /// Members in join order. Join order breaks ranking ties.
    pub members: Vec<HandoffMember>,
    /// Game-specific settings, passed through from room creation.
    #[serde(default)]
    pub config: serde_json::Value,
    pub bind_host: String,
    /// 0 lets the OS choose; the chosen port comes back in `Ready`.
    pub bind_port: u16,
    pub min_players: usize,
    #[serde(default)]
    pub start_policy: StartPolicy,
    pub round_deadline_ms: u64,
    pub handshake_timeout_ms: u64,
    /// How long to wait for all members to connect and get ready.
    pub start_timeout_ms: u64,
}

impl HandoffContext {
    /// Encodes the context as the value of [`HANDOFF_ENV`].
    pub fn to_env_value(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parses and validates the value of [`HANDOFF_ENV`].
    pub fn from_env_value(value: &str) -> Result<Self, ProtocolError> {
        let ctx: Self =
            serde_json::from_str(value).map_err(ProtocolError::Decode)?;
        ctx.validate()?;
        Ok(ctx)
    }

    /// Reads the context from this process's environment.
    ///
    /// Called once in a game server's `main`.
    pub fn from_env() -> Result<Self, ProtocolError> {
        let value = std::env::var(HANDOFF_ENV).map_err(|_| {
            ProtocolError::InvalidHandoff(format!("{HANDOFF_ENV} is not set"))
        })?;
        Self::from_env_value(&value)
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.members.is_empty() {
            return Err(ProtocolError::InvalidHandoff(
                "member list is empty".into(),
            ));
        }
        if self.min_players == 0 || self.min_players > self.members.len() {
            return Err(ProtocolError::InvalidHandoff(format!(
                "min_players {} does not fit {} members",
                self.min_players,
                self.members.len()
            )));
        }
        if self.token_key.is_empty() {
            return Err(ProtocolError::InvalidHandoff(
                "token key is empty".into(),
            ));
        }
        Ok(())
    }

    /// `host:port` to bind the game listener to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    /// Member ids in join order.
    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.members.iter().map(|m| m.player_id).collect()
    }
}

/// Final outcome of one match attempt.
///
/// Produced by the game server on a normal exit, or synthesized by the
/// supervisor when the process dies without reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitReport {
    pub room_id: RoomId,
    pub game_id: GameId,
    pub status: CompletionStatus,
    /// Per-player scores in join order.
    pub scores: Vec<ScoreEntry>,
    pub ranking: Vec<RankEntry>,
    pub rounds_played: u32,
    /// `true` unless every configured round was played.
    pub incomplete: bool,
}

impl ExitReport {
    /// Builds a report for a crash, using the last scores the process
    /// reported before it died.
    pub fn crashed(
        room_id: RoomId,
        game_id: GameId,
        last_scores: Vec<ScoreEntry>,
        rounds_played: u32,
    ) -> Self {
        let ranking = RankEntry::rank(&last_scores);
        Self {
            room_id,
            game_id,
            status: CompletionStatus::Crashed,
            scores: last_scores,
            ranking,
            rounds_played,
            incomplete: true,
        }
    }
}

/// Game-server process → supervisor, framed on the child's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessReport {
    /// The listener is bound and accepting handshakes.
    Ready { bind_addr: String },

    /// A round was resolved. Keeps the supervisor's crash fallback current.
    Progress { round: u32, scores: Vec<ScoreEntry> },

    Finished { report: ExitReport },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> HandoffContext {
        HandoffContext {
            room_id: RoomId(1),
            game_id: GameId::from("rps"),
            token_key: "00ff".into(),
            members: vec![
                HandoffMember {
                    player_id: PlayerId(10),
                    display_name: "ann".into(),
                },
                HandoffMember {
                    player_id: PlayerId(11),
                    display_name: "bob".into(),
                },
            ],
            config: serde_json::json!({ "rounds": 3 }),
            bind_host: "127.0.0.1".into(),
            bind_port: 0,
            min_players: 2,
            start_policy: StartPolicy::AllReady,
            round_deadline_ms: 15_000,
            handshake_timeout_ms: 5_000,
            start_timeout_ms: 60_000,
        }
    }

    #[test]
    fn test_env_value_parses_back() {
        let ctx = context();
        let value = ctx.to_env_value().unwrap();
        assert_eq!(HandoffContext::from_env_value(&value).unwrap(), ctx);
    }

    #[test]
    fn test_from_env_value_rejects_empty_members() {
        let mut ctx = context();
        ctx.members.clear();
        let value = ctx.to_env_value().unwrap();
        assert!(matches!(
            HandoffContext::from_env_value(&value),
            Err(ProtocolError::InvalidHandoff(_))
        ));
    }

    #[test]
    fn test_from_env_value_rejects_min_above_members() {
        let mut ctx = context();
        ctx.min_players = 3;
        let value = ctx.to_env_value().unwrap();
        assert!(HandoffContext::from_env_value(&value).is_err());
    }

    #[test]
    fn test_from_env_value_rejects_garbage() {
        assert!(matches!(
            HandoffContext::from_env_value("not json"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_member_ids_keep_join_order() {
        assert_eq!(context().member_ids(), vec![PlayerId(10), PlayerId(11)]);
        assert_eq!(context().bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn test_crashed_report_is_incomplete_and_ranked() {
        let report = ExitReport::crashed(
            RoomId(1),
            GameId::from("rps"),
            vec![
                ScoreEntry {
                    player_id: PlayerId(10),
                    score: 1,
                },
                ScoreEntry {
                    player_id: PlayerId(11),
                    score: 2,
                },
            ],
            2,
        );
        assert_eq!(report.status, CompletionStatus::Crashed);
        assert!(report.incomplete);
        assert_eq!(report.ranking[0].player_id, PlayerId(11));
    }

    #[test]
    fn test_process_report_json_format() {
        let json = serde_json::to_value(ProcessReport::Ready {
            bind_addr: "127.0.0.1:4000".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "Ready");
        assert_eq!(json["bind_addr"], "127.0.0.1:4000");
    }
}
