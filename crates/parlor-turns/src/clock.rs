//! Round deadline timer.
//!
//! The clock sits inside the match actor's `tokio::select!` loop next to
//! the command queue:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* connect, ready, submit ... */ }
//!         round = clock.expired() => {
//!             let steps = engine.deadline_elapsed(round);
//!         }
//!     }
//! }
//! ```
//!
//! While disarmed, [`RoundClock::expired`] pends forever, so the
//! `select!` only wakes for commands.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// One-shot deadline for the currently active round.
#[derive(Debug, Default)]
pub struct RoundClock {
    /// Round the deadline belongs to, and when it fires.
    deadline: Option<(u32, Instant)>,
}

impl RoundClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the deadline for `round`, replacing any earlier one.
    pub fn arm(&mut self, round: u32, after: Duration) {
        let at = Instant::now() + after;
        self.deadline = Some((round, at));
        debug!(round, deadline_ms = after.as_millis() as u64, "round clock armed");
    }

    /// Cancels the pending deadline, if any.
    pub fn disarm(&mut self) {
        if let Some((round, _)) = self.deadline.take() {
            trace!(round, "round clock disarmed");
        }
    }

    /// The round the clock is currently armed for.
    pub fn armed_round(&self) -> Option<u32> {
        self.deadline.map(|(round, _)| round)
    }

    /// Time left until the deadline, or `None` when disarmed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|(_, at)| at.saturating_duration_since(Instant::now()))
    }

    /// Waits for the armed deadline and returns its round number.
    ///
    /// Cancel-safe: the clock is only disarmed after the sleep completes,
    /// so dropping this future inside `select!` keeps the deadline armed.
    pub async fn expired(&mut self) -> u32 {
        let Some((round, at)) = self.deadline else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(at).await;
        self.deadline = None;
        trace!(round, "round deadline elapsed");
        round
    }
}
