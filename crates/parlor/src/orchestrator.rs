//! Orchestration: from a room going Starting to the room closing.
//!
//! ```text
//! Started ──spawn──→ await ready ──→ mark in progress ──→ tokens ──→ announce
//!                       │                                                │
//!                       └─ fail: abort, revert to Open            on exit: record,
//!                                                                 close, revoke
//! ```
//!
//! Each start runs in its own task, so a slow game server never delays
//! another room.

use std::sync::Arc;
use std::time::Duration;

use parlor_protocol::{ExitReport, HandoffContext, RoomId, ScoreEntry};
use parlor_room::{RoomEvent, StartRequest};
use parlor_session::now_ms;
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::{Catalog, MatchRecord};

/// Consumes room events until the registry goes away, pruning stale token
/// issuances along the way.
pub(crate) async fn run_orchestrator<C: Catalog>(
    state: Arc<ServerState<C>>,
    mut events: mpsc::UnboundedReceiver<RoomEvent>,
) {
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                handle_event(&state, event).await;
            }
            _ = sweep.tick() => {
                let removed = state.tokens.lock().await.expire_stale();
                if removed > 0 {
                    tracing::debug!(removed, "expired room tokens pruned");
                }
            }
        }
    }
    tracing::debug!("room event stream ended");
}

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

async fn handle_event<C: Catalog>(state: &Arc<ServerState<C>>, event: RoomEvent) {
    match event {
        RoomEvent::Started(request) => {
            tokio::spawn(start_match(Arc::clone(state), request));
        }
        RoomEvent::Closed { room_id, reason } => {
            tracing::info!(%room_id, %reason, "room closed");
            state.rooms.forget(room_id);
            state.tokens.lock().await.revoke_room(room_id);
            state.invites.lock().await.forget_room(room_id);
        }
    }
}

fn handoff_context<C: Catalog>(
    state: &ServerState<C>,
    request: &StartRequest,
    token_key: String,
) -> HandoffContext {
    let config = &state.config;
    HandoffContext {
        room_id: request.room_id,
        game_id: request.game_id.clone(),
        token_key,
        members: request.members.clone(),
        config: request.config.clone(),
        bind_host: config.game_host.clone(),
        bind_port: 0,
        min_players: request.min_players,
        start_policy: config.start_policy,
        round_deadline_ms: millis(config.round_deadline),
        handshake_timeout_ms: millis(config.game_handshake_timeout),
        start_timeout_ms: millis(config.game_start_timeout),
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Drives one match attempt for a room that just went Starting.
async fn start_match<C: Catalog>(state: Arc<ServerState<C>>, request: StartRequest) {
    let room_id = request.room_id;
    let key = state.tokens.lock().await.register_room(room_id);
    let ctx = handoff_context(&state, &request, key.to_hex());

    let handle = match state.supervisor.spawn(ctx).await {
        Ok(handle) => {
            tracing::debug!(%room_id, pid = ?handle.pid(), "game server spawned");
            handle
        }
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "game server spawn failed");
            spawn_failed(&state, room_id, e.to_string()).await;
            return;
        }
    };

    let ready_timeout = state.supervisor.config().ready_timeout;
    let bind_addr = match state.supervisor.await_ready(&handle, ready_timeout).await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "game server never became ready");
            state.supervisor.abort(room_id).await;
            // Wait for the process to be reaped so the next attempt for
            // this room is not refused as already running.
            let _ = state.supervisor.on_exit(&handle).await;
            spawn_failed(&state, room_id, e.to_string()).await;
            return;
        }
    };

    if let Err(e) = state.rooms.mark_in_progress(room_id, bind_addr.clone()).await {
        tracing::warn!(%room_id, error = %e, "room vanished while starting");
        state.supervisor.abort(room_id).await;
        let _ = state.supervisor.on_exit(&handle).await;
        state.tokens.lock().await.revoke_room(room_id);
        return;
    }

    let tokens = {
        let mut authority = state.tokens.lock().await;
        let mut tokens = Vec::with_capacity(request.members.len());
        for member in &request.members {
            match authority.issue_token(room_id, member.player_id) {
                Ok(token) => tokens.push((member.player_id, token.into_string())),
                Err(e) => {
                    tracing::error!(%room_id, player_id = %member.player_id, error = %e, "token issue failed");
                }
            }
        }
        tokens
    };
    match state.rooms.announce_start(room_id, tokens).await {
        Ok(delivered) => {
            tracing::info!(%room_id, %bind_addr, delivered, "match announced");
        }
        Err(e) => tracing::warn!(%room_id, error = %e, "announce failed"),
    }

    let report = match state.supervisor.on_exit(&handle).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(%room_id, error = %e, "no exit report, synthesizing one");
            let scores = request
                .members
                .iter()
                .map(|m| ScoreEntry {
                    player_id: m.player_id,
                    score: 0,
                })
                .collect();
            ExitReport::crashed(room_id, request.game_id.clone(), scores, 0)
        }
    };
    finish_match(&state, request, report).await;
}

/// Records the result, then closes the room and revokes its tokens. The
/// room only closes after the report has been handed to the catalog.
async fn finish_match<C: Catalog>(
    state: &ServerState<C>,
    request: StartRequest,
    report: ExitReport,
) {
    let room_id = request.room_id;
    let status = report.status;
    let record = MatchRecord {
        players: request.members,
        report,
        finished_at_ms: now_ms(),
    };
    if let Err(e) = state.catalog.record_result(&record).await {
        tracing::error!(%room_id, error = %e, "failed to record match result");
    }

    let reason = format!("match {status}");
    if let Err(e) = state.rooms.close(room_id, reason).await {
        tracing::debug!(%room_id, error = %e, "room already gone at match end");
    }
    state.tokens.lock().await.revoke_room(room_id);
    tracing::info!(%room_id, %status, "match finished");
}

async fn spawn_failed<C: Catalog>(state: &ServerState<C>, room_id: RoomId, reason: String) {
    state.tokens.lock().await.revoke_room(room_id);
    if let Err(e) = state.rooms.revert_to_open(room_id, reason).await {
        tracing::debug!(%room_id, error = %e, "room gone before revert");
    }
}
