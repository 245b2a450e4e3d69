//! Turn synchronization engine for Parlor.
//!
//! Every hosted game runs the same state machine: wait for the roster,
//! collect one action per player under a deadline, resolve the round
//! deterministically, repeat until the rules say the match is over.
//!
//! - [`MatchEngine`]: the clock-free state machine.
//! - [`RuleSet`]: the per-game plugin it delegates scoring to.
//! - [`RoundClock`]: the deadline timer the owning actor selects on.
//!
//! ```
//! use parlor_protocol::{Action, PlayerId, StartPolicy};
//! use parlor_turns::{MatchEngine, MatchSettings, PairwiseRules, Step};
//!
//! let mut engine = MatchEngine::new(
//!     Box::new(PairwiseRules::rock_paper_scissors(1)),
//!     vec![PlayerId(1), PlayerId(2)],
//!     MatchSettings { start_policy: StartPolicy::OnConnect, ..Default::default() },
//! );
//! engine.connect(PlayerId(1)).unwrap();
//! let steps = engine.connect(PlayerId(2)).unwrap();
//! assert!(matches!(steps[0], Step::RoundStarted { round: 1, .. }));
//!
//! engine.submit(PlayerId(1), 1, Action::from("rock")).unwrap();
//! let steps = engine.submit(PlayerId(2), 1, Action::from("scissors")).unwrap();
//! assert!(matches!(steps.last(), Some(Step::Finished(_))));
//! assert_eq!(engine.score_of(PlayerId(1)), Some(1));
//! ```

mod clock;
mod engine;
mod error;
mod rules;

pub use clock::RoundClock;
pub use engine::{MatchEngine, MatchSettings, MatchSummary, ResolvedRound, Step};
pub use error::EngineError;
pub use rules::{
    DEFAULT_ROUNDS, FORFEIT, PairwiseRules, RoundOutcome, RuleSet, rules_for,
};
