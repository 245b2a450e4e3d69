//! Room actor: an isolated Tokio task that owns one room's membership.
//!
//! Each room runs in its own task and is only reachable through its
//! command channel, so mutations of a room apply one at a time and the
//! "everyone ready" check never sees a half-updated member list.

use std::time::Duration;

use parlor_protocol::{
    GameId, HandoffMember, LobbyEvent, MemberView, PlayerId, RoomId,
    RoomSnapshot, RoomState, RoomSummary,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::RoomError;

/// Channel sender for delivering lobby events to a player's connection.
pub type PlayerSender = mpsc::UnboundedSender<LobbyEvent>;

/// Everything the orchestrator needs to launch a room's game server.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub room_id: RoomId,
    pub game_id: GameId,
    /// Members in join order.
    pub members: Vec<HandoffMember>,
    pub min_players: usize,
    pub config: serde_json::Value,
}

/// Lifecycle notifications emitted by room actors.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The room went Open → Starting. Emitted once per open period.
    Started(StartRequest),

    /// The room closed on its own (owner left, emptied, idle) or was
    /// closed by the registry. The actor has stopped.
    Closed { room_id: RoomId, reason: String },
}

pub(crate) type EventSender = mpsc::UnboundedSender<RoomEvent>;

/// Commands sent to a room actor through its channel.
///
/// Variants with a `reply` are request/response; the caller awaits the
/// answer on the oneshot.
pub(crate) enum RoomCommand {
    Join {
        player_id: PlayerId,
        display_name: String,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<MemberView, RoomError>>,
    },

    /// Replies `true` if the room closed as a result.
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },

    SetReady {
        player_id: PlayerId,
        ready: bool,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },

    MarkInProgress {
        bind_addr: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Replies `true` if the room closed because nobody was left.
    RevertToOpen {
        reason: String,
        reply: oneshot::Sender<Result<bool, RoomError>>,
    },

    AnnounceStart {
        tokens: Vec<(PlayerId, String)>,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },

    Close {
        reason: String,
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    code: String,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns `true` once the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }

    pub async fn join(
        &self,
        player_id: PlayerId,
        display_name: String,
        sender: PlayerSender,
    ) -> Result<MemberView, RoomError> {
        self.request(|reply| RoomCommand::Join {
            player_id,
            display_name,
            sender,
            reply,
        })
        .await?
    }

    /// Removes a member. Returns `true` if the room closed as a result.
    pub async fn leave(&self, player_id: PlayerId) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Leave { player_id, reply })
            .await?
    }

    pub async fn set_ready(
        &self,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SetReady {
            player_id,
            ready,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        self.request(|reply| RoomCommand::Snapshot { reply }).await
    }

    pub async fn mark_in_progress(
        &self,
        bind_addr: String,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::MarkInProgress { bind_addr, reply })
            .await?
    }

    pub async fn revert_to_open(
        &self,
        reason: String,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::RevertToOpen { reason, reply })
            .await?
    }

    /// Delivers one `RoomStarted` per member that has a token. Returns
    /// how many were delivered.
    pub async fn announce_start(
        &self,
        tokens: Vec<(PlayerId, String)>,
    ) -> Result<usize, RoomError> {
        self.request(|reply| RoomCommand::AnnounceStart { tokens, reply })
            .await?
    }

    pub async fn close(&self, reason: String) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Close { reason, reply })
            .await
    }
}

/// Parameters for a new room. The owner is its first member.
pub(crate) struct NewRoom {
    pub room_id: RoomId,
    pub code: String,
    pub game_id: GameId,
    pub owner: PlayerId,
    pub owner_name: String,
    pub owner_sender: PlayerSender,
    pub min_players: usize,
    pub max_players: usize,
    pub config: serde_json::Value,
}

struct Member {
    player_id: PlayerId,
    display_name: String,
    ready: bool,
    sender: PlayerSender,
}

impl Member {
    fn view(&self) -> MemberView {
        MemberView {
            player_id: self.player_id,
            display_name: self.display_name.clone(),
            ready: self.ready,
        }
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room_id: RoomId,
    code: String,
    game_id: GameId,
    owner: PlayerId,
    state: RoomState,
    min_players: usize,
    max_players: usize,
    config: serde_json::Value,
    /// Join order.
    members: Vec<Member>,
    bind_addr: Option<String>,
    idle_timeout: Duration,
    last_activity: Instant,
    events: EventSender,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(
            room_id = %self.room_id,
            code = %self.code,
            game = %self.game_id,
            "room actor started"
        );
        self.broadcast_snapshot();

        loop {
            let idle_at = self
                .state
                .is_open()
                .then(|| self.last_activity + self.idle_timeout);

            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.last_activity = Instant::now();
                    if !self.handle(cmd) {
                        break;
                    }
                }
                _ = sleep_until_opt(idle_at) => {
                    tracing::info!(room_id = %self.room_id, "room idle");
                    self.close("idle timeout");
                    break;
                }
            }
        }

        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    /// Applies one command. Returns `false` when the actor should stop.
    fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                player_id,
                display_name,
                sender,
                reply,
            } => {
                let result = self.handle_join(player_id, display_name, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player_id, reply } => {
                let result = self.handle_leave(player_id);
                let closed = matches!(result, Ok(true));
                let _ = reply.send(result);
                return !closed;
            }
            RoomCommand::SetReady {
                player_id,
                ready,
                reply,
            } => {
                let _ = reply.send(self.handle_set_ready(player_id, ready));
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RoomCommand::MarkInProgress { bind_addr, reply } => {
                let _ = reply.send(self.handle_mark_in_progress(bind_addr));
            }
            RoomCommand::RevertToOpen { reason, reply } => {
                let result = self.handle_revert(&reason);
                let closed = matches!(result, Ok(true));
                let _ = reply.send(result);
                return !closed;
            }
            RoomCommand::AnnounceStart { tokens, reply } => {
                let _ = reply.send(self.handle_announce(tokens));
            }
            RoomCommand::Close { reason, reply } => {
                self.close(&reason);
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn handle_join(
        &mut self,
        player_id: PlayerId,
        display_name: String,
        sender: PlayerSender,
    ) -> Result<MemberView, RoomError> {
        if !self.state.is_open() {
            return Err(RoomError::NotOpen(self.room_id, self.state));
        }
        if self.position(player_id).is_some() {
            return Err(RoomError::AlreadyInRoom(player_id, self.room_id));
        }
        if self.members.len() >= self.max_players {
            return Err(RoomError::RoomFull(self.room_id));
        }

        let member = Member {
            player_id,
            display_name,
            ready: false,
            sender,
        };
        let view = member.view();
        self.members.push(member);
        tracing::info!(
            room_id = %self.room_id,
            %player_id,
            players = self.members.len(),
            "player joined"
        );

        self.broadcast_snapshot();
        Ok(view)
    }

    fn handle_leave(&mut self, player_id: PlayerId) -> Result<bool, RoomError> {
        let idx = self
            .position(player_id)
            .ok_or(RoomError::NotInRoom(player_id, self.room_id))?;
        let member = self.members.remove(idx);
        let _ = member.sender.send(LobbyEvent::LeftRoom {
            room_id: self.room_id,
        });
        tracing::info!(
            room_id = %self.room_id,
            %player_id,
            players = self.members.len(),
            "player left"
        );

        // Once a game server owns the match, the room stays until its
        // report is in.
        if self.state.is_open() {
            if player_id == self.owner {
                self.close("owner left");
                return Ok(true);
            }
            if self.members.is_empty() {
                self.close("room empty");
                return Ok(true);
            }
        }

        self.broadcast_snapshot();
        self.maybe_start();
        Ok(false)
    }

    fn handle_set_ready(
        &mut self,
        player_id: PlayerId,
        ready: bool,
    ) -> Result<(), RoomError> {
        let idx = self
            .position(player_id)
            .ok_or(RoomError::NotInRoom(player_id, self.room_id))?;
        if !self.state.is_open() {
            return Err(RoomError::NotOpen(self.room_id, self.state));
        }

        self.members[idx].ready = ready;
        tracing::debug!(room_id = %self.room_id, %player_id, ready, "ready changed");
        self.broadcast_snapshot();
        self.maybe_start();
        Ok(())
    }

    fn handle_mark_in_progress(
        &mut self,
        bind_addr: String,
    ) -> Result<(), RoomError> {
        if self.state != RoomState::Starting {
            return Err(self.wrong_state("mark in progress"));
        }
        tracing::info!(room_id = %self.room_id, %bind_addr, "room in progress");
        self.state = RoomState::InProgress;
        self.bind_addr = Some(bind_addr);
        self.broadcast_snapshot();
        Ok(())
    }

    fn handle_revert(&mut self, reason: &str) -> Result<bool, RoomError> {
        if self.state != RoomState::Starting {
            return Err(self.wrong_state("revert to open"));
        }
        tracing::warn!(room_id = %self.room_id, %reason, "start failed, room reopened");

        self.state = RoomState::Open;
        self.bind_addr = None;
        for member in &mut self.members {
            member.ready = false;
        }
        self.send_all(LobbyEvent::SpawnFailed {
            room_id: self.room_id,
            reason: reason.to_string(),
        });

        if self.members.is_empty() {
            self.close("room empty");
            return Ok(true);
        }
        if self.position(self.owner).is_none() {
            self.owner = self.members[0].player_id;
            tracing::info!(room_id = %self.room_id, owner = %self.owner, "ownership passed on");
        }
        self.broadcast_snapshot();
        Ok(false)
    }

    fn handle_announce(
        &mut self,
        tokens: Vec<(PlayerId, String)>,
    ) -> Result<usize, RoomError> {
        let Some(bind_addr) = self.bind_addr.clone() else {
            return Err(self.wrong_state("announce start"));
        };
        if self.state != RoomState::InProgress {
            return Err(self.wrong_state("announce start"));
        }

        let mut delivered = 0;
        for (player_id, token) in tokens {
            let Some(idx) = self.position(player_id) else {
                continue;
            };
            let sent = self.members[idx].sender.send(LobbyEvent::RoomStarted {
                room_id: self.room_id,
                bind_addr: bind_addr.clone(),
                token,
            });
            if sent.is_ok() {
                delivered += 1;
            }
        }
        tracing::debug!(room_id = %self.room_id, delivered, "room start announced");
        Ok(delivered)
    }

    fn maybe_start(&mut self) {
        if !self.state.is_open()
            || self.members.len() < self.min_players
            || !self.members.iter().all(|m| m.ready)
        {
            return;
        }

        self.state = RoomState::Starting;
        tracing::info!(
            room_id = %self.room_id,
            players = self.members.len(),
            "room starting"
        );
        self.broadcast_snapshot();

        let request = StartRequest {
            room_id: self.room_id,
            game_id: self.game_id.clone(),
            members: self
                .members
                .iter()
                .map(|m| HandoffMember {
                    player_id: m.player_id,
                    display_name: m.display_name.clone(),
                })
                .collect(),
            min_players: self.min_players,
            config: self.config.clone(),
        };
        let _ = self.events.send(RoomEvent::Started(request));
    }

    fn close(&mut self, reason: &str) {
        self.state = RoomState::Closed;
        self.send_all(LobbyEvent::RoomClosed {
            room_id: self.room_id,
            reason: reason.to_string(),
        });
        tracing::info!(room_id = %self.room_id, %reason, "room closed");
        let _ = self.events.send(RoomEvent::Closed {
            room_id: self.room_id,
            reason: reason.to_string(),
        });
    }

    fn wrong_state(&self, op: &str) -> RoomError {
        RoomError::InvalidState(
            self.room_id,
            format!("cannot {op} while {}", self.state),
        )
    }

    fn position(&self, player_id: PlayerId) -> Option<usize> {
        self.members.iter().position(|m| m.player_id == player_id)
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id,
            code: self.code.clone(),
            game_id: self.game_id.clone(),
            owner: self.owner,
            state: self.state,
            min_players: self.min_players,
            max_players: self.max_players,
            members: self.members.iter().map(Member::view).collect(),
        }
    }

    fn broadcast_snapshot(&self) {
        self.send_all(LobbyEvent::RoomState {
            room: self.snapshot(),
        });
    }

    /// Sends to every member. Members whose connection is gone are
    /// skipped; their handler removes them.
    fn send_all(&self, event: LobbyEvent) {
        for member in &self.members {
            let _ = member.sender.send(event.clone());
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Converts a snapshot into a listing entry.
pub(crate) fn summarize(snapshot: &RoomSnapshot) -> RoomSummary {
    RoomSummary {
        room_id: snapshot.room_id,
        code: snapshot.code.clone(),
        game_id: snapshot.game_id.clone(),
        state: snapshot.state,
        player_count: snapshot.members.len(),
        min_players: snapshot.min_players,
        max_players: snapshot.max_players,
    }
}

/// Spawns a new room actor task and returns a handle to it.
pub(crate) fn spawn_room(
    room: NewRoom,
    idle_timeout: Duration,
    channel_size: usize,
    events: EventSender,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let owner = Member {
        player_id: room.owner,
        display_name: room.owner_name,
        ready: false,
        sender: room.owner_sender,
    };
    let handle = RoomHandle {
        room_id: room.room_id,
        code: room.code.clone(),
        sender: tx,
    };
    let actor = RoomActor {
        room_id: room.room_id,
        code: room.code,
        game_id: room.game_id,
        owner: room.owner,
        state: RoomState::Open,
        min_players: room.min_players,
        max_players: room.max_players,
        config: room.config,
        members: vec![owner],
        bind_addr: None,
        idle_timeout,
        last_activity: Instant::now(),
        events,
        receiver: rx,
    };

    tokio::spawn(actor.run());
    handle
}
