//! The match actor: sole owner of the [`MatchEngine`] for one room.
//!
//! Connection tasks never touch the engine. They post commands through a
//! [`MatchHandle`] and receive [`GameEvent`]s on their own channel. The
//! actor drives the round deadline and the start timeout from the same
//! `select!` loop, so every input is applied in one order and every
//! broadcast goes out in that order.

use std::collections::HashMap;
use std::time::Duration;

use parlor_protocol::{
    Action, ExitReport, GameEvent, GameId, HandoffContext, MatchPhase,
    PlayerId, PlayerInfo, ProcessReport, RoomId,
};
use parlor_session::{TokenVerifier, now_ms};
use parlor_turns::{MatchEngine, MatchSummary, RoundClock, Step};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::GameServerError;

/// Where the actor sends a connected player's events.
pub(crate) type EventSender = mpsc::UnboundedSender<GameEvent>;

pub(crate) enum MatchCommand {
    Join {
        token: String,
        events: EventSender,
        reply: oneshot::Sender<Result<PlayerId, GameServerError>>,
    },
    Ready {
        player_id: PlayerId,
    },
    Submit {
        player_id: PlayerId,
        round: u32,
        action: Action,
    },
    Leave {
        player_id: PlayerId,
    },
}

/// Cloneable handle for posting inputs to the match.
#[derive(Clone)]
pub(crate) struct MatchHandle {
    tx: mpsc::Sender<MatchCommand>,
}

impl MatchHandle {
    /// Presents a handshake token. On success the player is connected and
    /// `events` starts receiving, beginning with `Welcome`.
    pub(crate) async fn join(
        &self,
        token: String,
        events: EventSender,
    ) -> Result<PlayerId, GameServerError> {
        let (reply, rx) = oneshot::channel();
        self.send(MatchCommand::Join {
            token,
            events,
            reply,
        })
        .await?;
        rx.await.map_err(|_| GameServerError::MatchClosed)?
    }

    pub(crate) async fn ready(
        &self,
        player_id: PlayerId,
    ) -> Result<(), GameServerError> {
        self.send(MatchCommand::Ready { player_id }).await
    }

    pub(crate) async fn submit(
        &self,
        player_id: PlayerId,
        round: u32,
        action: Action,
    ) -> Result<(), GameServerError> {
        self.send(MatchCommand::Submit {
            player_id,
            round,
            action,
        })
        .await
    }

    pub(crate) async fn leave(
        &self,
        player_id: PlayerId,
    ) -> Result<(), GameServerError> {
        self.send(MatchCommand::Leave { player_id }).await
    }

    async fn send(&self, cmd: MatchCommand) -> Result<(), GameServerError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| GameServerError::MatchClosed)
    }
}

/// Aborts the match when dropped. A finished match ignores it.
pub(crate) struct MatchGuard {
    _cancel: oneshot::Sender<()>,
}

/// Actor state. Lives inside the task started by [`spawn_match`].
struct MatchActor {
    room_id: RoomId,
    game_id: GameId,
    players: Vec<PlayerInfo>,
    engine: MatchEngine,
    clock: RoundClock,
    verifier: TokenVerifier,
    clients: HashMap<PlayerId, EventSender>,
    reports: mpsc::UnboundedSender<ProcessReport>,
    start_by: Instant,
}

/// Starts the match actor. The task resolves with the final report once
/// the match has finished, for whatever reason. Dropping the returned
/// [`MatchGuard`] aborts the match.
pub(crate) fn spawn_match(
    ctx: &HandoffContext,
    engine: MatchEngine,
    verifier: TokenVerifier,
    reports: mpsc::UnboundedSender<ProcessReport>,
) -> (MatchHandle, MatchGuard, tokio::task::JoinHandle<ExitReport>) {
    let (tx, rx) = mpsc::channel(64);
    let (cancel, cancelled) = oneshot::channel();
    let actor = MatchActor {
        room_id: ctx.room_id,
        game_id: ctx.game_id.clone(),
        players: ctx
            .members
            .iter()
            .map(|m| PlayerInfo {
                player_id: m.player_id,
                display_name: m.display_name.clone(),
            })
            .collect(),
        engine,
        clock: RoundClock::new(),
        verifier,
        clients: HashMap::new(),
        reports,
        start_by: Instant::now() + Duration::from_millis(ctx.start_timeout_ms),
    };
    let task = tokio::spawn(actor.run(rx, cancelled));
    (MatchHandle { tx }, MatchGuard { _cancel: cancel }, task)
}

impl MatchActor {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<MatchCommand>,
        mut cancelled: oneshot::Receiver<()>,
    ) -> ExitReport {
        tracing::info!(
            room_id = %self.room_id,
            game = %self.game_id,
            players = self.players.len(),
            "match waiting for players"
        );

        loop {
            let waiting = self.engine.phase() == MatchPhase::Waiting;
            let steps = tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    // Every handle is gone: nobody can reach the match.
                    None => self.engine.abort(),
                },
                // Only the guard's drop resolves this.
                _ = &mut cancelled => {
                    tracing::warn!(room_id = %self.room_id, "match cancelled");
                    self.engine.abort()
                }
                round = self.clock.expired() => {
                    self.engine.deadline_elapsed(round)
                }
                _ = time::sleep_until(self.start_by), if waiting => {
                    self.engine.start_timeout()
                }
            };

            if let Some(summary) = self.dispatch(steps) {
                return self.exit_report(summary);
            }
        }
    }

    fn handle(&mut self, cmd: MatchCommand) -> Vec<Step> {
        match cmd {
            MatchCommand::Join {
                token,
                events,
                reply,
            } => match self.admit(&token) {
                Ok((player_id, steps)) => {
                    let _ = events.send(self.welcome(player_id));
                    let _ = events.send(self.engine.snapshot());
                    self.clients.insert(player_id, events);
                    let _ = reply.send(Ok(player_id));
                    steps
                }
                Err(e) => {
                    tracing::info!(room_id = %self.room_id, error = %e, "handshake rejected");
                    let _ = reply.send(Err(e));
                    Vec::new()
                }
            },
            MatchCommand::Ready { player_id } => {
                let result = self.engine.mark_ready(player_id);
                self.or_reply(player_id, result)
            }
            MatchCommand::Submit {
                player_id,
                round,
                action,
            } => {
                let result = self.engine.submit(player_id, round, action);
                self.or_reply(player_id, result)
            }
            MatchCommand::Leave { player_id } => {
                self.clients.remove(&player_id);
                self.engine.disconnect(player_id)
            }
        }
    }

    /// Checks the token, connects the player, and only then burns the
    /// token so a rejected connect can be retried.
    fn admit(
        &mut self,
        token: &str,
    ) -> Result<(PlayerId, Vec<Step>), GameServerError> {
        let now = now_ms();
        let grant = self.verifier.validate_at(token, now)?;
        let steps = self.engine.connect(grant.player_id)?;
        self.verifier.consume_at(token, now)?;
        tracing::info!(room_id = %self.room_id, player_id = %grant.player_id, "player joined match");
        Ok((grant.player_id, steps))
    }

    /// Answers a rejected input. A closing code also drops the player's
    /// sender, which ends the connection once the error is written; the
    /// connection's leave then disconnects the player.
    fn or_reply(
        &mut self,
        player_id: PlayerId,
        result: Result<Vec<Step>, parlor_turns::EngineError>,
    ) -> Vec<Step> {
        match result {
            Ok(steps) => steps,
            Err(e) => {
                let code = e.code();
                tracing::debug!(%player_id, error = %e, "input rejected");
                self.send_to(player_id, GameEvent::error(code, e.to_string()));
                if code.closes_connection() {
                    tracing::info!(room_id = %self.room_id, %player_id, error = %e, "closing connection");
                    self.clients.remove(&player_id);
                }
                Vec::new()
            }
        }
    }

    /// Applies side effects of `steps` and broadcasts them in order.
    /// Returns the summary once the match has finished.
    fn dispatch(&mut self, steps: Vec<Step>) -> Option<MatchSummary> {
        for step in steps {
            match &step {
                Step::RoundStarted { round, deadline } => {
                    self.clock.arm(*round, *deadline);
                }
                Step::RoundResolved(resolved) => {
                    self.clock.disarm();
                    let _ = self.reports.send(ProcessReport::Progress {
                        round: resolved.round,
                        scores: resolved.totals.clone(),
                    });
                }
                Step::PlayerLeft(player_id) => {
                    tracing::info!(room_id = %self.room_id, %player_id, "player left match");
                }
                Step::BelowMinimum { active, min_players } => {
                    tracing::info!(room_id = %self.room_id, active, min_players, "too few players left");
                }
                Step::Finished(_) => self.clock.disarm(),
            }

            self.broadcast(step.to_event());

            if let Step::Finished(summary) = step {
                return Some(summary);
            }
        }
        None
    }

    fn exit_report(&self, summary: MatchSummary) -> ExitReport {
        tracing::info!(
            room_id = %self.room_id,
            status = %summary.status,
            rounds = summary.rounds_played,
            "match finished"
        );
        ExitReport {
            room_id: self.room_id,
            game_id: self.game_id.clone(),
            status: summary.status,
            scores: summary.scores,
            ranking: summary.ranking,
            rounds_played: summary.rounds_played,
            incomplete: summary.incomplete,
        }
    }

    fn welcome(&self, player_id: PlayerId) -> GameEvent {
        GameEvent::Welcome {
            player_id,
            room_id: self.room_id,
            game_id: self.game_id.clone(),
            players: self.players.clone(),
            total_rounds: self.engine.total_rounds(),
            deadline_ms: self.engine.settings().round_deadline.as_millis()
                as u64,
        }
    }

    fn send_to(&self, player_id: PlayerId, event: GameEvent) {
        if let Some(tx) = self.clients.get(&player_id) {
            let _ = tx.send(event);
        }
    }

    fn broadcast(&self, event: GameEvent) {
        for tx in self.clients.values() {
            let _ = tx.send(event.clone());
        }
    }
}
