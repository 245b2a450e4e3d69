//! The match state machine.
//!
//! ```text
//! Waiting ──start──▶ RoundActive ──all in / deadline──▶ Resolving
//!                        ▲                                  │
//!                        └────────── next round ────────────┤
//!                                                           ▼
//!                                                       Finished
//! ```
//!
//! [`MatchEngine`] is pure and has no clock. Every input returns the
//! [`Step`]s it caused, in the order they must be broadcast; the owner
//! of the engine turns them into [`GameEvent`]s and arms its
//! [`RoundClock`](crate::RoundClock) on [`Step::RoundStarted`].

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parlor_protocol::{
    Action, CompletionStatus, ErrorCode, GameEvent, MatchPhase, PairOutcome, PlayerAction,
    PlayerId, RankEntry, ScoreEntry, StartPolicy,
};
use tracing::{debug, info};

use crate::{EngineError, RuleSet};

/// Per-match knobs, taken from the handoff context.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Active players below this end the match early.
    pub min_players: usize,
    pub start_policy: StartPolicy,
    pub round_deadline: Duration,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            min_players: 2,
            start_policy: StartPolicy::AllReady,
            round_deadline: Duration::from_secs(15),
        }
    }
}

/// A resolved round, ready to broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRound {
    pub round: u32,
    /// Every roster player's action in join order, defaults flagged.
    pub actions: Vec<PlayerAction>,
    pub pairings: Vec<PairOutcome>,
    pub deltas: Vec<ScoreEntry>,
    pub totals: Vec<ScoreEntry>,
}

/// Final result of a match. Emitted exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub status: CompletionStatus,
    pub rounds_played: u32,
    /// Every roster player in join order, including forfeited ones.
    pub scores: Vec<ScoreEntry>,
    pub ranking: Vec<RankEntry>,
    pub incomplete: bool,
}

/// Something that happened as a result of an engine input.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    RoundStarted { round: u32, deadline: Duration },
    RoundResolved(ResolvedRound),
    PlayerLeft(PlayerId),
    /// Too few players remain to go on. Always followed by an aborted
    /// `Finished`.
    BelowMinimum { active: usize, min_players: usize },
    Finished(MatchSummary),
}

impl Step {
    /// The client-facing broadcast for this step.
    pub fn to_event(&self) -> GameEvent {
        match self {
            Step::RoundStarted { round, deadline } => GameEvent::RoundStart {
                round: *round,
                deadline_ms: deadline.as_millis() as u64,
            },
            Step::RoundResolved(r) => GameEvent::RoundResult {
                round: r.round,
                actions: r.actions.clone(),
                pairings: r.pairings.clone(),
                deltas: r.deltas.clone(),
                totals: r.totals.clone(),
            },
            Step::PlayerLeft(player_id) => GameEvent::PlayerLeft {
                player_id: *player_id,
            },
            Step::BelowMinimum {
                active,
                min_players,
            } => GameEvent::error(
                ErrorCode::BelowMinimum,
                format!("{active} player(s) left, {min_players} needed"),
            ),
            Step::Finished(s) => GameEvent::MatchOver {
                status: s.status,
                rounds_played: s.rounds_played,
                scores: s.scores.clone(),
                ranking: s.ranking.clone(),
            },
        }
    }
}

/// Authoritative state of one match.
pub struct MatchEngine {
    rules: Box<dyn RuleSet>,
    settings: MatchSettings,
    /// Join order. Fixed for the whole match.
    roster: Vec<PlayerId>,
    connected: HashSet<PlayerId>,
    ready: HashSet<PlayerId>,
    forfeited: HashSet<PlayerId>,
    phase: MatchPhase,
    round: u32,
    rounds_played: u32,
    /// Real submissions for the active round only.
    submissions: HashMap<PlayerId, Action>,
    /// Cumulative scores, same order as `roster`.
    scores: Vec<ScoreEntry>,
    summary: Option<MatchSummary>,
}

impl MatchEngine {
    /// Creates an engine waiting for `roster` to connect.
    ///
    /// Duplicate ids in `roster` are ignored after their first position.
    pub fn new(
        rules: Box<dyn RuleSet>,
        roster: Vec<PlayerId>,
        settings: MatchSettings,
    ) -> Self {
        let mut seen = HashSet::new();
        let roster: Vec<PlayerId> =
            roster.into_iter().filter(|p| seen.insert(*p)).collect();
        let scores = roster
            .iter()
            .map(|&player_id| ScoreEntry { player_id, score: 0 })
            .collect();
        let settings = MatchSettings {
            min_players: settings.min_players.max(1),
            ..settings
        };

        Self {
            rules,
            settings,
            roster,
            connected: HashSet::new(),
            ready: HashSet::new(),
            forfeited: HashSet::new(),
            phase: MatchPhase::Waiting,
            round: 0,
            rounds_played: 0,
            submissions: HashMap::new(),
            scores,
            summary: None,
        }
    }

    // -- Inputs -----------------------------------------------------------

    /// A roster player completed the handshake.
    pub fn connect(
        &mut self,
        player: PlayerId,
    ) -> Result<Vec<Step>, EngineError> {
        self.check_member(player)?;
        if self.connected.contains(&player) {
            return Err(EngineError::AlreadyConnected(player));
        }
        if self.phase != MatchPhase::Waiting {
            return Err(EngineError::WrongPhase(self.phase));
        }

        self.connected.insert(player);
        debug!(%player, connected = self.connected.len(), "player connected");
        Ok(self.try_start())
    }

    /// A connected player declared themselves ready. Only valid while
    /// waiting for the start.
    pub fn mark_ready(
        &mut self,
        player: PlayerId,
    ) -> Result<Vec<Step>, EngineError> {
        self.check_member(player)?;
        if !self.connected.contains(&player) {
            return Err(EngineError::NotMember(player));
        }
        if self.phase != MatchPhase::Waiting {
            return Err(EngineError::WrongPhase(self.phase));
        }

        self.ready.insert(player);
        Ok(self.try_start())
    }

    /// Records `player`'s action for `round`.
    ///
    /// # Errors
    /// The submission is rejected without side effects if no round is
    /// active, `round` is not the active round, the player already
    /// submitted, or the rules refuse the action.
    pub fn submit(
        &mut self,
        player: PlayerId,
        round: u32,
        action: Action,
    ) -> Result<Vec<Step>, EngineError> {
        self.check_member(player)?;
        if self.phase != MatchPhase::RoundActive {
            return Err(EngineError::WrongPhase(self.phase));
        }
        if round != self.round {
            return Err(EngineError::StaleRound {
                submitted: round,
                current: self.round,
            });
        }
        if self.submissions.contains_key(&player) {
            return Err(EngineError::AlreadySubmitted(player));
        }
        self.rules
            .validate_action(&action)
            .map_err(EngineError::InvalidAction)?;

        self.submissions.insert(player, action);
        debug!(%player, round, "action submitted");

        if self.all_active_submitted() {
            Ok(self.close_round())
        } else {
            Ok(Vec::new())
        }
    }

    /// The deadline for `round` fired. Stale deadlines are ignored.
    pub fn deadline_elapsed(&mut self, round: u32) -> Vec<Step> {
        if self.phase != MatchPhase::RoundActive || round != self.round {
            return Vec::new();
        }
        debug!(
            round,
            missing = self.active_count() - self.submissions.len(),
            "round deadline elapsed"
        );
        self.close_round()
    }

    /// A player's connection went away. They forfeit every remaining
    /// round; their score so far stays in the summary.
    pub fn disconnect(&mut self, player: PlayerId) -> Vec<Step> {
        if !self.roster.contains(&player)
            || self.forfeited.contains(&player)
            || self.phase == MatchPhase::Finished
        {
            return Vec::new();
        }

        self.connected.remove(&player);
        self.ready.remove(&player);
        self.forfeited.insert(player);
        self.submissions.remove(&player);
        info!(%player, round = self.round, "player forfeited");

        let mut steps = vec![Step::PlayerLeft(player)];
        if self.active_count() < self.settings.min_players {
            steps.extend(self.below_minimum(self.active_count()));
            return steps;
        }

        match self.phase {
            MatchPhase::Waiting => steps.extend(self.try_start()),
            MatchPhase::RoundActive if self.all_active_submitted() => {
                steps.extend(self.close_round())
            }
            _ => {}
        }
        steps
    }

    /// Nobody started the match in time. Absent players forfeit and the
    /// match starts with whoever is connected, or aborts if that is too
    /// few.
    pub fn start_timeout(&mut self) -> Vec<Step> {
        if self.phase != MatchPhase::Waiting {
            return Vec::new();
        }

        let absent: Vec<PlayerId> = self
            .roster
            .iter()
            .copied()
            .filter(|p| !self.connected.contains(p))
            .collect();
        for player in &absent {
            self.forfeited.insert(*player);
        }
        info!(
            connected = self.connected.len(),
            absent = absent.len(),
            "start timeout"
        );

        if self.connected.len() >= self.settings.min_players {
            self.start_round(1)
        } else {
            self.below_minimum(self.connected.len())
        }
    }

    /// Ends the match immediately.
    pub fn abort(&mut self) -> Vec<Step> {
        if self.phase == MatchPhase::Finished {
            return Vec::new();
        }
        self.finish(CompletionStatus::Aborted)
    }

    // -- Queries ----------------------------------------------------------

    /// State snapshot for a player who just joined.
    pub fn snapshot(&self) -> GameEvent {
        GameEvent::StateSnapshot {
            phase: self.phase,
            round: self.round,
            connected: self
                .roster
                .iter()
                .copied()
                .filter(|p| self.connected.contains(p))
                .collect(),
            scores: self.scores.clone(),
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// The active round, or the last one once finished. `0` before start.
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn rounds_played(&self) -> u32 {
        self.rounds_played
    }

    pub fn total_rounds(&self) -> u32 {
        self.rules.total_rounds()
    }

    pub fn scores(&self) -> &[ScoreEntry] {
        &self.scores
    }

    pub fn score_of(&self, player: PlayerId) -> Option<i64> {
        self.scores
            .iter()
            .find(|s| s.player_id == player)
            .map(|s| s.score)
    }

    pub fn roster(&self) -> &[PlayerId] {
        &self.roster
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn rules(&self) -> &dyn RuleSet {
        self.rules.as_ref()
    }

    pub fn is_connected(&self, player: PlayerId) -> bool {
        self.connected.contains(&player)
    }

    pub fn has_forfeited(&self, player: PlayerId) -> bool {
        self.forfeited.contains(&player)
    }

    /// Roster players who have not forfeited.
    pub fn active_count(&self) -> usize {
        self.roster.len() - self.forfeited.len()
    }

    pub fn is_finished(&self) -> bool {
        self.phase == MatchPhase::Finished
    }

    /// The final summary, once the match has finished.
    pub fn summary(&self) -> Option<&MatchSummary> {
        self.summary.as_ref()
    }

    // -- Transitions ------------------------------------------------------

    fn check_member(&self, player: PlayerId) -> Result<(), EngineError> {
        if !self.roster.contains(&player) {
            return Err(EngineError::NotMember(player));
        }
        if self.forfeited.contains(&player) {
            return Err(EngineError::Forfeited(player));
        }
        Ok(())
    }

    fn all_active_submitted(&self) -> bool {
        self.submissions.len() >= self.active_count()
    }

    fn try_start(&mut self) -> Vec<Step> {
        if self.phase != MatchPhase::Waiting {
            return Vec::new();
        }
        let expected: Vec<PlayerId> = self
            .roster
            .iter()
            .copied()
            .filter(|p| !self.forfeited.contains(p))
            .collect();
        if expected.len() < self.settings.min_players {
            return Vec::new();
        }
        if !expected.iter().all(|p| self.connected.contains(p)) {
            return Vec::new();
        }
        let go = match self.settings.start_policy {
            StartPolicy::OnConnect => true,
            StartPolicy::AllReady => {
                expected.iter().all(|p| self.ready.contains(p))
            }
        };
        if !go {
            return Vec::new();
        }

        info!(
            players = expected.len(),
            rounds = self.rules.total_rounds(),
            game = %self.rules.game_id(),
            "match started"
        );
        self.start_round(1)
    }

    fn start_round(&mut self, round: u32) -> Vec<Step> {
        self.phase = MatchPhase::RoundActive;
        self.round = round;
        self.submissions.clear();
        vec![Step::RoundStarted {
            round,
            deadline: self.settings.round_deadline,
        }]
    }

    fn close_round(&mut self) -> Vec<Step> {
        self.phase = MatchPhase::Resolving;

        let mut submissions = std::mem::take(&mut self.submissions);
        let mut actions = Vec::with_capacity(self.roster.len());
        let mut action_set = Vec::with_capacity(self.roster.len());
        for &player_id in &self.roster {
            let (action, defaulted) = match submissions.remove(&player_id) {
                Some(action) => (action, false),
                None => (self.rules.default_action(), true),
            };
            action_set.push((player_id, action.clone()));
            actions.push(PlayerAction {
                player_id,
                action,
                defaulted,
            });
        }

        let outcome = self.rules.resolve_round(&action_set);
        for (player_id, delta) in &outcome.deltas {
            if let Some(entry) =
                self.scores.iter_mut().find(|s| s.player_id == *player_id)
            {
                entry.score += delta;
            }
        }
        self.rounds_played += 1;

        let resolved = ResolvedRound {
            round: self.round,
            actions,
            pairings: outcome.pairings,
            deltas: outcome
                .deltas
                .into_iter()
                .map(|(player_id, score)| ScoreEntry { player_id, score })
                .collect(),
            totals: self.scores.clone(),
        };
        debug!(round = self.round, "round resolved");

        let mut steps = vec![Step::RoundResolved(resolved)];
        if self.rules.is_match_over(self.rounds_played) {
            steps.extend(self.finish(CompletionStatus::Completed));
        } else {
            steps.extend(self.start_round(self.round + 1));
        }
        steps
    }

    fn below_minimum(&mut self, active: usize) -> Vec<Step> {
        let mut steps = vec![Step::BelowMinimum {
            active,
            min_players: self.settings.min_players,
        }];
        steps.extend(self.finish(CompletionStatus::Aborted));
        steps
    }

    fn finish(&mut self, status: CompletionStatus) -> Vec<Step> {
        self.phase = MatchPhase::Finished;
        self.submissions.clear();
        if self.summary.is_some() {
            return Vec::new();
        }

        let summary = MatchSummary {
            status,
            rounds_played: self.rounds_played,
            ranking: RankEntry::rank(&self.scores),
            scores: self.scores.clone(),
            incomplete: self.rounds_played < self.rules.total_rounds(),
        };
        info!(
            %status,
            rounds_played = summary.rounds_played,
            "match finished"
        );
        self.summary = Some(summary.clone());
        vec![Step::Finished(summary)]
    }
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("game", self.rules.game_id())
            .field("phase", &self.phase)
            .field("round", &self.round)
            .field("roster", &self.roster)
            .finish()
    }
}
