//! Per-game rule plugins.
//!
//! The match engine is game-agnostic. Everything game-specific (which
//! actions exist, what a missing action becomes, how a round is scored,
//! when the match ends) comes from a [`RuleSet`] chosen by game id when
//! the game server starts.

use std::collections::HashSet;

use parlor_protocol::{Action, GameId, PairOutcome, PlayerId};

use crate::EngineError;

/// Action substituted for players who did not submit in time.
pub const FORFEIT: &str = "forfeit";

/// Rounds played when the room config does not say otherwise.
pub const DEFAULT_ROUNDS: u32 = 5;

/// Result of resolving one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Per-pairing results, for games that compare players pairwise.
    pub pairings: Vec<PairOutcome>,
    /// Score change for every player in the action set, same order.
    pub deltas: Vec<(PlayerId, i64)>,
}

/// Capability interface every hosted game implements.
///
/// Implementations must be pure and deterministic: the same action set
/// always resolves to the same outcome.
pub trait RuleSet: Send + Sync + 'static {
    fn game_id(&self) -> &GameId;

    /// Number of rounds in a full match, announced to clients.
    fn total_rounds(&self) -> u32;

    /// Checks a submitted action. The error text is shown to the player.
    fn validate_action(&self, action: &Action) -> Result<(), String>;

    /// Action used for a player who did not submit before the deadline,
    /// or who left the match.
    fn default_action(&self) -> Action;

    /// Scores a complete action set, given in join order.
    fn resolve_round(&self, actions: &[(PlayerId, Action)]) -> RoundOutcome;

    /// `true` once `completed_rounds` rounds end the match.
    fn is_match_over(&self, completed_rounds: u32) -> bool {
        completed_rounds >= self.total_rounds()
    }
}

// ---------------------------------------------------------------------------
// PairwiseRules
// ---------------------------------------------------------------------------

/// Rules for simultaneous-move games decided by a fixed "beats" table.
///
/// Every unordered pair of players is compared; the winner of a pair
/// gets one point, a tie gives nothing. The default action is
/// [`FORFEIT`], which loses to every real move and ties with itself.
#[derive(Debug, Clone)]
pub struct PairwiseRules {
    game_id: GameId,
    moves: Vec<String>,
    /// `(winner, loser)` pairs.
    beats: HashSet<(String, String)>,
    rounds: u32,
}

impl PairwiseRules {
    /// Builds a rule set from a list of `(winner, loser)` pairs.
    pub fn new(
        game_id: GameId,
        moves: &[&str],
        beats: &[(&str, &str)],
        rounds: u32,
    ) -> Self {
        Self {
            game_id,
            moves: moves.iter().map(|m| m.to_string()).collect(),
            beats: beats
                .iter()
                .map(|(w, l)| (w.to_string(), l.to_string()))
                .collect(),
            rounds: rounds.max(1),
        }
    }

    /// Classic rock-paper-scissors.
    pub fn rock_paper_scissors(rounds: u32) -> Self {
        Self::new(
            GameId::from("rps"),
            &["rock", "paper", "scissors"],
            &[
                ("rock", "scissors"),
                ("paper", "rock"),
                ("scissors", "paper"),
            ],
            rounds,
        )
    }

    /// Rock-paper-scissors-lizard-spock.
    pub fn rock_paper_scissors_lizard_spock(rounds: u32) -> Self {
        Self::new(
            GameId::from("rpsls"),
            &["rock", "paper", "scissors", "lizard", "spock"],
            &[
                ("scissors", "paper"),
                ("paper", "rock"),
                ("rock", "lizard"),
                ("lizard", "spock"),
                ("spock", "scissors"),
                ("scissors", "lizard"),
                ("lizard", "paper"),
                ("paper", "spock"),
                ("spock", "rock"),
                ("rock", "scissors"),
            ],
            rounds,
        )
    }

    /// Builds a custom table from a room config of the form
    /// `{ "beats": { "fire": ["ice"], "ice": ["water"], ... } }`.
    pub fn from_config(
        game_id: GameId,
        config: &serde_json::Value,
        rounds: u32,
    ) -> Result<Self, EngineError> {
        let table = config
            .get("beats")
            .and_then(|b| b.as_object())
            .ok_or_else(|| EngineError::UnknownGame(game_id.clone()))?;

        let mut moves = Vec::new();
        let mut beats = HashSet::new();
        for (winner, losers) in table {
            if winner == FORFEIT {
                return Err(EngineError::InvalidConfig(format!(
                    "'{FORFEIT}' is reserved"
                )));
            }
            let losers = losers.as_array().ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "beats.{winner} must be a list of moves"
                ))
            })?;
            if !moves.contains(winner) {
                moves.push(winner.clone());
            }
            for loser in losers {
                let loser = loser.as_str().ok_or_else(|| {
                    EngineError::InvalidConfig(format!(
                        "beats.{winner} must contain strings"
                    ))
                })?;
                if !moves.iter().any(|m| m == loser) {
                    moves.push(loser.to_string());
                }
                beats.insert((winner.clone(), loser.to_string()));
            }
        }
        if moves.len() < 2 {
            return Err(EngineError::InvalidConfig(
                "a beats table needs at least two moves".into(),
            ));
        }
        for (w, l) in &beats {
            if beats.contains(&(l.clone(), w.clone())) {
                return Err(EngineError::InvalidConfig(format!(
                    "{w} and {l} cannot beat each other"
                )));
            }
        }

        Ok(Self {
            game_id,
            moves,
            beats,
            rounds: rounds.max(1),
        })
    }

    /// Who wins between two actions: `Some(true)` if `a` wins,
    /// `Some(false)` if `b` wins, `None` for a tie.
    pub fn compare(&self, a: &Action, b: &Action) -> Option<bool> {
        let (a, b) = (a.as_str(), b.as_str());
        if a == b {
            return None;
        }
        match (a == FORFEIT, b == FORFEIT) {
            (true, false) => return Some(false),
            (false, true) => return Some(true),
            _ => {}
        }
        if self.beats.contains(&(a.to_string(), b.to_string())) {
            Some(true)
        } else if self.beats.contains(&(b.to_string(), a.to_string())) {
            Some(false)
        } else {
            None
        }
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }
}

impl RuleSet for PairwiseRules {
    fn game_id(&self) -> &GameId {
        &self.game_id
    }

    fn total_rounds(&self) -> u32 {
        self.rounds
    }

    fn validate_action(&self, action: &Action) -> Result<(), String> {
        if self.moves.iter().any(|m| m == action.as_str()) {
            Ok(())
        } else {
            Err(format!(
                "unknown action '{action}', expected one of: {}",
                self.moves.join(", ")
            ))
        }
    }

    fn default_action(&self) -> Action {
        Action::from(FORFEIT)
    }

    fn resolve_round(&self, actions: &[(PlayerId, Action)]) -> RoundOutcome {
        let mut deltas: Vec<(PlayerId, i64)> =
            actions.iter().map(|(p, _)| (*p, 0)).collect();
        let mut pairings = Vec::new();

        for i in 0..actions.len() {
            for j in (i + 1)..actions.len() {
                let (pa, aa) = &actions[i];
                let (pb, ab) = &actions[j];
                let winner = match self.compare(aa, ab) {
                    Some(true) => {
                        deltas[i].1 += 1;
                        Some(*pa)
                    }
                    Some(false) => {
                        deltas[j].1 += 1;
                        Some(*pb)
                    }
                    None => None,
                };
                pairings.push(PairOutcome {
                    a: *pa,
                    b: *pb,
                    winner,
                });
            }
        }

        RoundOutcome { pairings, deltas }
    }
}

/// Selects the rule set for a room's game.
///
/// `config` is the room's game config blob; `rounds` (default
/// [`DEFAULT_ROUNDS`]) sets the match length. Unknown game ids are
/// accepted when the config carries a `beats` table.
pub fn rules_for(
    game_id: &GameId,
    config: &serde_json::Value,
) -> Result<Box<dyn RuleSet>, EngineError> {
    let rounds = match config.get("rounds") {
        None | Some(serde_json::Value::Null) => DEFAULT_ROUNDS,
        Some(v) => v
            .as_u64()
            .filter(|r| (1..=u32::MAX as u64).contains(r))
            .map(|r| r as u32)
            .ok_or_else(|| {
                EngineError::InvalidConfig(
                    "rounds must be a positive integer".into(),
                )
            })?,
    };

    let rules: Box<dyn RuleSet> = match game_id.as_str() {
        "rps" | "rock-paper-scissors" => {
            Box::new(PairwiseRules::rock_paper_scissors(rounds))
        }
        "rpsls" | "rock-paper-scissors-lizard-spock" => {
            Box::new(PairwiseRules::rock_paper_scissors_lizard_spock(rounds))
        }
        _ => Box::new(PairwiseRules::from_config(
            game_id.clone(),
            config,
            rounds,
        )?),
    };
    Ok(rules)
}
