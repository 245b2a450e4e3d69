//! Per-connection handler: token handshake, then request routing.
//!
//! Each accepted connection gets its own task running this handler.
//! The flow is:
//!   1. Receive `Handshake { token }` within the handshake timeout
//!   2. Present the token to the match → `Welcome` + snapshot
//!   3. Spawn a writer draining this player's events
//!   4. Loop: receive requests → post them to the match

use std::sync::Arc;
use std::time::Duration;

use parlor_protocol::{
    Codec, ErrorCode, GameEvent, GameRequest, JsonCodec, PlayerId,
    ProtocolError,
};
use parlor_transport::{Connection, TcpConnection};
use tokio::sync::mpsc;

use crate::GameServerError;
use crate::game::MatchHandle;

/// What every connection task shares.
pub(crate) struct ConnectionState {
    pub(crate) game: MatchHandle,
    pub(crate) codec: JsonCodec,
    pub(crate) handshake_timeout: Duration,
}

/// Drop guard that tells the match a player is gone when the handler
/// exits, including on panic.
struct LeaveGuard {
    player_id: PlayerId,
    game: MatchHandle,
}

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        let player_id = self.player_id;
        let game = self.game.clone();
        tokio::spawn(async move {
            let _ = game.leave(player_id).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    state: Arc<ConnectionState>,
) -> Result<(), GameServerError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new game connection");

    // --- Step 1: Handshake ---
    let token = perform_handshake(&conn, &state).await?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let player_id = match state.game.join(token, events_tx).await {
        Ok(player_id) => player_id,
        Err(e) => {
            send_error(&conn, &state.codec, e.code(), &e.to_string()).await?;
            let _ = conn.close().await;
            return Err(e);
        }
    };
    tracing::info!(%conn_id, %player_id, "player connected to match");
    let _guard = LeaveGuard {
        player_id,
        game: state.game.clone(),
    };

    // --- Step 2: Writer ---
    let mut writer = tokio::spawn(write_events(
        Arc::clone(&conn),
        state.codec,
        events_rx,
    ));

    // --- Step 3: Request loop ---
    loop {
        let data = tokio::select! {
            frame = conn.recv() => match frame {
                Ok(Some(data)) => data,
                Ok(None) => {
                    tracing::info!(%player_id, "connection closed cleanly");
                    break;
                }
                Err(e) => {
                    tracing::debug!(%player_id, error = %e, "recv error");
                    break;
                }
            },
            // The match dropped our event channel: it is over.
            _ = &mut writer => break,
        };

        let request: GameRequest = match state.codec.decode(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode request");
                send_error(
                    &conn,
                    &state.codec,
                    ErrorCode::ProtocolViolation,
                    "malformed request",
                )
                .await?;
                break;
            }
        };

        let posted = match request {
            GameRequest::Handshake { .. } => {
                send_error(
                    &conn,
                    &state.codec,
                    ErrorCode::ProtocolViolation,
                    "already handshaken",
                )
                .await?;
                break;
            }
            GameRequest::Ready => state.game.ready(player_id).await,
            GameRequest::SubmitAction { round, action } => {
                state.game.submit(player_id, round, action).await
            }
        };
        if posted.is_err() {
            break;
        }
    }

    let _ = conn.close().await;
    // _guard drops here → the match sees the player leave.
    Ok(())
}

/// Receives the first frame and extracts the handshake token.
async fn perform_handshake(
    conn: &TcpConnection,
    state: &ConnectionState,
) -> Result<String, GameServerError> {
    let data = match tokio::time::timeout(
        state.handshake_timeout,
        conn.recv(),
    )
    .await
    {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(GameServerError::Protocol(
                ProtocolError::InvalidMessage(
                    "connection closed before handshake".into(),
                ),
            ));
        }
        Ok(Err(e)) => return Err(GameServerError::Transport(e)),
        Err(_) => {
            send_error(conn, &state.codec, ErrorCode::Timeout, "handshake timed out")
                .await?;
            let _ = conn.close().await;
            return Err(GameServerError::Protocol(
                ProtocolError::InvalidMessage("handshake timed out".into()),
            ));
        }
    };

    let request: Result<GameRequest, _> = state.codec.decode(&data);
    match request {
        Ok(GameRequest::Handshake { token }) => Ok(token),
        _ => {
            send_error(
                conn,
                &state.codec,
                ErrorCode::ProtocolViolation,
                "expected Handshake",
            )
            .await?;
            let _ = conn.close().await;
            Err(GameServerError::Protocol(ProtocolError::InvalidMessage(
                "first message must be Handshake".into(),
            )))
        }
    }
}

/// Drains the player's event channel onto the socket, then closes the
/// sending side.
async fn write_events(
    conn: Arc<TcpConnection>,
    codec: JsonCodec,
    mut events: mpsc::UnboundedReceiver<GameEvent>,
) -> Result<(), GameServerError> {
    while let Some(event) = events.recv().await {
        let bytes = codec.encode(&event)?;
        conn.send(&bytes).await?;
    }
    conn.close().await?;
    Ok(())
}

/// Sends an error event straight to the socket.
async fn send_error(
    conn: &TcpConnection,
    codec: &JsonCodec,
    code: ErrorCode,
    message: &str,
) -> Result<(), GameServerError> {
    let bytes = codec.encode(&GameEvent::error(code, message))?;
    conn.send(&bytes).await?;
    Ok(())
}
