//! Integration tests for the match state machine.
//!
//! Naming convention: `test_{function}_{scenario}_{expected}`.

use std::time::Duration;

use parlor_protocol::{
    Action, CompletionStatus, ErrorCode, GameEvent, MatchPhase, PlayerId, ScoreEntry,
    StartPolicy,
};
use parlor_turns::{
    EngineError, FORFEIT, MatchEngine, MatchSettings, MatchSummary,
    PairwiseRules, ResolvedRound, Step,
};

// =========================================================================
// Helpers
// =========================================================================

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn act(s: &str) -> Action {
    Action::from(s)
}

fn settings(min_players: usize, start_policy: StartPolicy) -> MatchSettings {
    MatchSettings {
        min_players,
        start_policy,
        round_deadline: Duration::from_secs(10),
    }
}

fn rps(players: u64, rounds: u32, min_players: usize) -> MatchEngine {
    MatchEngine::new(
        Box::new(PairwiseRules::rock_paper_scissors(rounds)),
        (1..=players).map(pid).collect(),
        settings(min_players, StartPolicy::AllReady),
    )
}

/// Connects and readies every roster player; returns the last steps.
fn start(engine: &mut MatchEngine) -> Vec<Step> {
    let roster = engine.roster().to_vec();
    for &p in &roster {
        engine.connect(p).unwrap();
    }
    let mut steps = Vec::new();
    for &p in &roster {
        steps = engine.mark_ready(p).unwrap();
    }
    steps
}

fn resolved(steps: &[Step]) -> &ResolvedRound {
    steps
        .iter()
        .find_map(|s| match s {
            Step::RoundResolved(r) => Some(r),
            _ => None,
        })
        .expect("no RoundResolved step")
}

fn finished(steps: &[Step]) -> Option<&MatchSummary> {
    steps.iter().find_map(|s| match s {
        Step::Finished(summary) => Some(summary),
        _ => None,
    })
}

fn delta(round: &ResolvedRound, player: u64) -> i64 {
    round
        .deltas
        .iter()
        .find(|d| d.player_id == pid(player))
        .map(|d| d.score)
        .unwrap()
}

/// Plays one full round where every active player submits `moves[i]`.
fn play_round(engine: &mut MatchEngine, moves: &[(u64, &str)]) -> Vec<Step> {
    let round = engine.round();
    let mut steps = Vec::new();
    for (p, m) in moves {
        steps = engine.submit(pid(*p), round, act(m)).unwrap();
    }
    steps
}

// =========================================================================
// Start conditions
// =========================================================================

#[test]
fn test_start_waits_for_every_player_to_connect() {
    let mut e = rps(3, 5, 2);
    e.connect(pid(1)).unwrap();
    e.connect(pid(2)).unwrap();
    e.mark_ready(pid(1)).unwrap();
    let steps = e.mark_ready(pid(2)).unwrap();

    assert!(steps.is_empty());
    assert_eq!(e.phase(), MatchPhase::Waiting);
}

#[test]
fn test_start_all_ready_starts_round_one() {
    let mut e = rps(2, 5, 2);

    let steps = start(&mut e);

    assert_eq!(
        steps,
        vec![Step::RoundStarted {
            round: 1,
            deadline: Duration::from_secs(10)
        }]
    );
    assert_eq!(e.phase(), MatchPhase::RoundActive);
    assert_eq!(e.round(), 1);
}

#[test]
fn test_start_not_everyone_ready_keeps_waiting() {
    let mut e = rps(2, 5, 2);
    e.connect(pid(1)).unwrap();
    e.connect(pid(2)).unwrap();

    let steps = e.mark_ready(pid(1)).unwrap();

    assert!(steps.is_empty());
    assert_eq!(e.phase(), MatchPhase::Waiting);
}

#[test]
fn test_start_on_connect_policy_ignores_ready() {
    let mut e = MatchEngine::new(
        Box::new(PairwiseRules::rock_paper_scissors(5)),
        vec![pid(1), pid(2)],
        settings(2, StartPolicy::OnConnect),
    );
    e.connect(pid(1)).unwrap();

    let steps = e.connect(pid(2)).unwrap();

    assert!(matches!(steps[..], [Step::RoundStarted { round: 1, .. }]));
}

#[test]
fn test_mark_ready_before_connect_returns_not_member() {
    let mut e = rps(2, 5, 2);
    assert_eq!(e.mark_ready(pid(1)), Err(EngineError::NotMember(pid(1))));
}

#[test]
fn test_mark_ready_after_start_returns_wrong_phase() {
    let mut e = rps(2, 5, 2);
    start(&mut e);

    let err = e.mark_ready(pid(1)).unwrap_err();
    assert_eq!(err, EngineError::WrongPhase(MatchPhase::RoundActive));
    assert_eq!(err.code(), ErrorCode::ProtocolViolation);
    assert!(err.code().closes_connection());
    assert_eq!(e.round(), 1);
}

#[test]
fn test_start_timeout_enough_players_forfeits_absent_and_starts() {
    let mut e = rps(3, 5, 2);
    e.connect(pid(1)).unwrap();
    e.connect(pid(3)).unwrap();

    let steps = e.start_timeout();

    assert!(matches!(steps[..], [Step::RoundStarted { round: 1, .. }]));
    assert!(e.has_forfeited(pid(2)));
    assert_eq!(e.active_count(), 2);
}

#[test]
fn test_start_timeout_too_few_players_aborts() {
    let mut e = rps(3, 5, 2);
    e.connect(pid(1)).unwrap();

    let steps = e.start_timeout();

    assert!(matches!(
        steps[0].to_event(),
        GameEvent::Error {
            code: ErrorCode::BelowMinimum,
            ..
        }
    ));
    let summary = finished(&steps).expect("should finish");
    assert_eq!(summary.status, CompletionStatus::Aborted);
    assert_eq!(summary.rounds_played, 0);
    assert!(summary.incomplete);
    assert!(e.is_finished());
}

#[test]
fn test_start_timeout_after_start_is_noop() {
    let mut e = rps(2, 5, 2);
    start(&mut e);

    assert!(e.start_timeout().is_empty());
    assert!(!e.has_forfeited(pid(1)));
}

#[test]
fn test_connect_after_start_timeout_returns_forfeited() {
    let mut e = rps(3, 5, 2);
    e.connect(pid(1)).unwrap();
    e.connect(pid(2)).unwrap();
    e.start_timeout();

    assert_eq!(e.connect(pid(3)), Err(EngineError::Forfeited(pid(3))));
}

// =========================================================================
// Submissions
// =========================================================================

#[test]
fn test_submit_before_start_returns_wrong_phase() {
    let mut e = rps(2, 5, 2);
    e.connect(pid(1)).unwrap();

    let err = e.submit(pid(1), 1, act("rock")).unwrap_err();
    assert_eq!(err, EngineError::WrongPhase(MatchPhase::Waiting));
    assert_eq!(err.code(), ErrorCode::ProtocolViolation);
}

#[test]
fn test_submit_wrong_round_returns_stale_round() {
    let mut e = rps(2, 5, 2);
    start(&mut e);

    assert_eq!(
        e.submit(pid(1), 2, act("rock")),
        Err(EngineError::StaleRound {
            submitted: 2,
            current: 1
        })
    );
}

#[test]
fn test_submit_twice_rejected_and_first_action_kept() {
    let mut e = rps(3, 5, 2);
    start(&mut e);
    e.submit(pid(1), 1, act("rock")).unwrap();

    let second = e.submit(pid(1), 1, act("paper"));
    assert_eq!(second, Err(EngineError::AlreadySubmitted(pid(1))));

    e.submit(pid(2), 1, act("scissors")).unwrap();
    let steps = e.submit(pid(3), 1, act("scissors")).unwrap();
    let round = resolved(&steps);
    assert_eq!(round.actions[0].action, act("rock"));
    assert!(!round.actions[0].defaulted);
}

#[test]
fn test_submit_invalid_action_rejected() {
    let mut e = rps(2, 5, 2);
    start(&mut e);

    assert!(matches!(
        e.submit(pid(1), 1, act("lizard")),
        Err(EngineError::InvalidAction(_))
    ));
    assert!(matches!(
        e.submit(pid(1), 1, act(FORFEIT)),
        Err(EngineError::InvalidAction(_))
    ));
}

#[test]
fn test_submit_stranger_returns_not_member() {
    let mut e = rps(2, 5, 2);
    start(&mut e);

    assert_eq!(
        e.submit(pid(7), 1, act("rock")),
        Err(EngineError::NotMember(pid(7)))
    );
}

#[test]
fn test_submit_last_player_closes_round_and_starts_next() {
    let mut e = rps(2, 5, 2);
    start(&mut e);
    e.submit(pid(1), 1, act("rock")).unwrap();

    let steps = e.submit(pid(2), 1, act("scissors")).unwrap();

    assert_eq!(steps.len(), 2);
    assert!(matches!(steps[0], Step::RoundResolved(_)));
    assert!(matches!(steps[1], Step::RoundStarted { round: 2, .. }));
    assert_eq!(e.score_of(pid(1)), Some(1));
    assert_eq!(e.score_of(pid(2)), Some(0));
}

#[test]
fn test_submit_previous_round_after_close_is_stale() {
    let mut e = rps(2, 5, 2);
    start(&mut e);
    play_round(&mut e, &[(1, "rock"), (2, "rock")]);

    assert!(matches!(
        e.submit(pid(1), 1, act("paper")),
        Err(EngineError::StaleRound { submitted: 1, current: 2 })
    ));
}

// =========================================================================
// Deadlines
// =========================================================================

#[test]
fn test_deadline_elapsed_substitutes_default_for_missing() {
    let mut e = rps(3, 5, 2);
    start(&mut e);
    e.submit(pid(1), 1, act("rock")).unwrap();

    let steps = e.deadline_elapsed(1);
    let round = resolved(&steps);

    assert!(!round.actions[0].defaulted);
    assert_eq!(round.actions[1].action, act(FORFEIT));
    assert!(round.actions[1].defaulted);
    assert!(round.actions[2].defaulted);
    // rock beats both forfeits; forfeits tie each other.
    assert_eq!(delta(round, 1), 2);
    assert_eq!(delta(round, 2), 0);
    assert_eq!(delta(round, 3), 0);
}

#[test]
fn test_deadline_elapsed_stale_round_ignored() {
    let mut e = rps(2, 5, 2);
    start(&mut e);
    play_round(&mut e, &[(1, "rock"), (2, "paper")]);

    assert!(e.deadline_elapsed(1).is_empty());
    assert_eq!(e.round(), 2);
    assert_eq!(e.phase(), MatchPhase::RoundActive);
}

#[test]
fn test_deadline_elapsed_before_start_ignored() {
    let mut e = rps(2, 5, 2);
    assert!(e.deadline_elapsed(0).is_empty());
    assert!(e.deadline_elapsed(1).is_empty());
}

// =========================================================================
// Resolution
// =========================================================================

#[test]
fn test_resolution_four_players_rock_paper_scissors_rock() {
    let mut e = rps(4, 5, 2);
    start(&mut e);

    let steps = play_round(
        &mut e,
        &[(1, "rock"), (2, "paper"), (3, "scissors"), (4, "rock")],
    );
    let round = resolved(&steps);

    assert_eq!(delta(round, 1), 1);
    assert_eq!(delta(round, 2), 2);
    assert_eq!(delta(round, 3), 1);
    assert_eq!(delta(round, 4), 1);
    assert_eq!(round.pairings.len(), 6);
    assert_eq!(
        round.totals,
        vec![
            ScoreEntry { player_id: pid(1), score: 1 },
            ScoreEntry { player_id: pid(2), score: 2 },
            ScoreEntry { player_id: pid(3), score: 1 },
            ScoreEntry { player_id: pid(4), score: 1 },
        ]
    );
}

#[test]
fn test_resolution_identical_inputs_identical_outcomes() {
    let moves = [(1, "paper"), (2, "scissors"), (3, "paper")];
    let run = || {
        let mut e = rps(3, 3, 2);
        start(&mut e);
        let mut history = Vec::new();
        for _ in 0..3 {
            history.extend(play_round(&mut e, &moves));
        }
        history
    };

    assert_eq!(run(), run());
}

#[test]
fn test_submitted_actions_used_unmodified() {
    let mut e = rps(2, 5, 2);
    start(&mut e);

    let steps = play_round(&mut e, &[(2, "scissors"), (1, "paper")]);
    let round = resolved(&steps);

    assert_eq!(round.actions[0].player_id, pid(1));
    assert_eq!(round.actions[0].action, act("paper"));
    assert_eq!(round.actions[1].action, act("scissors"));
    assert!(round.actions.iter().all(|a| !a.defaulted));
}

// =========================================================================
// Match completion
// =========================================================================

#[test]
fn test_final_round_emits_summary_once() {
    let mut e = rps(2, 2, 2);
    start(&mut e);
    play_round(&mut e, &[(1, "rock"), (2, "scissors")]);

    let steps = play_round(&mut e, &[(1, "rock"), (2, "paper")]);

    let summary = finished(&steps).expect("match should finish");
    assert_eq!(summary.status, CompletionStatus::Completed);
    assert_eq!(summary.rounds_played, 2);
    assert!(!summary.incomplete);
    assert_eq!(e.phase(), MatchPhase::Finished);

    assert!(e.abort().is_empty());
    assert!(e.start_timeout().is_empty());
    assert!(e.disconnect(pid(1)).is_empty());
    assert_eq!(e.summary(), Some(summary));
}

#[test]
fn test_finished_rejects_submissions() {
    let mut e = rps(2, 1, 2);
    start(&mut e);
    play_round(&mut e, &[(1, "rock"), (2, "rock")]);

    assert_eq!(
        e.submit(pid(1), 1, act("rock")),
        Err(EngineError::WrongPhase(MatchPhase::Finished))
    );
}

#[test]
fn test_ranking_ties_broken_by_join_order() {
    let mut e = MatchEngine::new(
        Box::new(PairwiseRules::rock_paper_scissors(1)),
        vec![pid(5), pid(3), pid(9)],
        settings(2, StartPolicy::OnConnect),
    );
    e.connect(pid(5)).unwrap();
    e.connect(pid(3)).unwrap();
    e.connect(pid(9)).unwrap();

    // Everyone plays rock: all tie at zero.
    let round = e.round();
    e.submit(pid(9), round, act("rock")).unwrap();
    e.submit(pid(5), round, act("rock")).unwrap();
    let steps = e.submit(pid(3), round, act("rock")).unwrap();

    let summary = finished(&steps).unwrap();
    let order: Vec<PlayerId> =
        summary.ranking.iter().map(|r| r.player_id).collect();
    assert_eq!(order, vec![pid(5), pid(3), pid(9)]);
    assert_eq!(
        summary.ranking.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn test_ranking_orders_by_cumulative_score() {
    let mut e = rps(3, 2, 2);
    start(&mut e);
    play_round(&mut e, &[(1, "rock"), (2, "paper"), (3, "rock")]);
    let steps = play_round(&mut e, &[(1, "rock"), (2, "paper"), (3, "scissors")]);

    let summary = finished(&steps).unwrap();
    // P2: 2 + 1 = 3; P1: 0 + 1 = 1; P3: 0 + 1 = 1 (P1 before P3 by join order).
    assert_eq!(summary.ranking[0].player_id, pid(2));
    assert_eq!(summary.ranking[0].score, 3);
    assert_eq!(summary.ranking[1].player_id, pid(1));
    assert_eq!(summary.ranking[2].player_id, pid(3));
}

#[test]
fn test_abort_mid_match_marks_incomplete() {
    let mut e = rps(2, 5, 2);
    start(&mut e);
    play_round(&mut e, &[(1, "paper"), (2, "rock")]);

    let steps = e.abort();

    let summary = finished(&steps).unwrap();
    assert_eq!(summary.status, CompletionStatus::Aborted);
    assert_eq!(summary.rounds_played, 1);
    assert!(summary.incomplete);
    assert_eq!(summary.scores[0].score, 1);
}

// =========================================================================
// Disconnects
// =========================================================================

#[test]
fn test_disconnect_round_two_of_five_forfeits_rest_and_freezes_score() {
    let mut e = rps(3, 5, 2);
    start(&mut e);
    // Round 1: P3 wins twice.
    play_round(&mut e, &[(1, "scissors"), (2, "scissors"), (3, "rock")]);
    assert_eq!(e.score_of(pid(3)), Some(2));

    // Round 2: P3 submits, then leaves before the round closes.
    e.submit(pid(3), 2, act("paper")).unwrap();
    let steps = e.disconnect(pid(3));
    assert_eq!(steps, vec![Step::PlayerLeft(pid(3))]);
    assert!(!e.is_finished());

    let mut last = Vec::new();
    for _ in 2..=5 {
        last = play_round(&mut e, &[(1, "rock"), (2, "rock")]);
        let round = resolved(&last);
        let p3 = round.actions.iter().find(|a| a.player_id == pid(3)).unwrap();
        assert_eq!(p3.action, act(FORFEIT));
        assert!(p3.defaulted);
    }

    let summary = finished(&last).expect("match should complete");
    assert_eq!(summary.status, CompletionStatus::Completed);
    assert_eq!(summary.rounds_played, 5);
    let p3 = summary.scores.iter().find(|s| s.player_id == pid(3)).unwrap();
    assert_eq!(p3.score, 2);
}

#[test]
fn test_disconnect_last_missing_submitter_closes_round() {
    let mut e = rps(3, 5, 2);
    start(&mut e);
    e.submit(pid(1), 1, act("rock")).unwrap();
    e.submit(pid(2), 1, act("paper")).unwrap();

    let steps = e.disconnect(pid(3));

    assert!(matches!(steps[0], Step::PlayerLeft(p) if p == pid(3)));
    assert!(matches!(steps[1], Step::RoundResolved(_)));
    assert!(matches!(steps[2], Step::RoundStarted { round: 2, .. }));
}

#[test]
fn test_disconnect_below_minimum_aborts() {
    let mut e = rps(2, 5, 2);
    start(&mut e);

    let steps = e.disconnect(pid(2));

    assert_eq!(
        steps[1],
        Step::BelowMinimum {
            active: 1,
            min_players: 2
        }
    );
    let summary = finished(&steps).expect("match should abort");
    assert_eq!(summary.status, CompletionStatus::Aborted);
    assert!(summary.incomplete);
    assert_eq!(summary.scores.len(), 2);
}

#[test]
fn test_disconnect_while_waiting_lets_others_start() {
    let mut e = rps(3, 5, 2);
    e.connect(pid(1)).unwrap();
    e.connect(pid(2)).unwrap();
    e.mark_ready(pid(1)).unwrap();
    e.mark_ready(pid(2)).unwrap();
    e.connect(pid(3)).unwrap();

    let steps = e.disconnect(pid(3));

    assert!(matches!(steps[0], Step::PlayerLeft(_)));
    assert!(matches!(steps[1], Step::RoundStarted { round: 1, .. }));
}

#[test]
fn test_disconnect_twice_is_noop() {
    let mut e = rps(3, 5, 2);
    start(&mut e);
    e.disconnect(pid(3));

    assert!(e.disconnect(pid(3)).is_empty());
    assert_eq!(
        e.submit(pid(3), 1, act("rock")),
        Err(EngineError::Forfeited(pid(3)))
    );
}

// =========================================================================
// Snapshots and events
// =========================================================================

#[test]
fn test_snapshot_lists_connected_in_join_order() {
    let mut e = rps(3, 5, 2);
    e.connect(pid(3)).unwrap();
    e.connect(pid(1)).unwrap();

    match e.snapshot() {
        GameEvent::StateSnapshot {
            phase,
            round,
            connected,
            scores,
        } => {
            assert_eq!(phase, MatchPhase::Waiting);
            assert_eq!(round, 0);
            assert_eq!(connected, vec![pid(1), pid(3)]);
            assert_eq!(scores.len(), 3);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_finished_step_converts_to_match_over() {
    let mut e = rps(2, 1, 2);
    start(&mut e);
    let steps = play_round(&mut e, &[(1, "paper"), (2, "rock")]);

    let event = steps.last().unwrap().to_event();

    match event {
        GameEvent::MatchOver {
            status, ranking, ..
        } => {
            assert_eq!(status, CompletionStatus::Completed);
            assert_eq!(ranking[0].player_id, pid(1));
        }
        other => panic!("unexpected {other:?}"),
    }
}
