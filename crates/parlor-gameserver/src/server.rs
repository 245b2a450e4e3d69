//! `GameServer`: one listener, one match, one exit report.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parlor_protocol::{
    ExitReport, HandoffContext, JsonCodec, ProcessReport,
};
use parlor_session::TokenVerifier;
use parlor_transport::{TcpTransport, Transport, TransportError};
use parlor_turns::{MatchEngine, MatchSettings, rules_for};
use tokio::sync::mpsc;

use crate::GameServerError;
use crate::game::spawn_match;
use crate::handler::{ConnectionState, handle_connection};

/// A bound game server for one room.
///
/// ```rust,ignore
/// let server = GameServer::bind(HandoffContext::from_env()?).await?;
/// let report = server.run(reports_tx).await?;
/// ```
pub struct GameServer {
    ctx: HandoffContext,
    transport: TcpTransport,
    engine: MatchEngine,
    verifier: TokenVerifier,
}

impl GameServer {
    /// Validates the handoff, loads the game's rules and binds the
    /// listener. Nothing is reported until [`run`](Self::run).
    ///
    /// # Errors
    /// Fails on an inconsistent context, an unknown game or bad game
    /// config, a malformed token key, or a bind failure.
    pub async fn bind(ctx: HandoffContext) -> Result<Self, GameServerError> {
        ctx.validate()?;
        let rules = rules_for(&ctx.game_id, &ctx.config)?;
        let verifier = TokenVerifier::from_hex(ctx.room_id, &ctx.token_key)?;
        let settings = MatchSettings {
            min_players: ctx.min_players,
            start_policy: ctx.start_policy,
            round_deadline: Duration::from_millis(ctx.round_deadline_ms),
        };
        let engine = MatchEngine::new(rules, ctx.member_ids(), settings);
        let transport = TcpTransport::bind(&ctx.bind_addr()).await?;

        Ok(Self {
            ctx,
            transport,
            engine,
            verifier,
        })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn context(&self) -> &HandoffContext {
        &self.ctx
    }

    /// Announces readiness, serves the match and returns its report.
    ///
    /// `reports` receives `Ready`, a `Progress` per resolved round and
    /// finally `Finished`. The listener stops once the match is over.
    pub async fn run(
        self,
        reports: mpsc::UnboundedSender<ProcessReport>,
    ) -> Result<ExitReport, GameServerError> {
        let Self {
            ctx,
            mut transport,
            engine,
            verifier,
        } = self;

        let bind_addr = transport
            .local_addr()
            .map_err(TransportError::AcceptFailed)?
            .to_string();

        // Dropping the guard (this future being aborted) aborts the match.
        let (game, _guard, mut finished) =
            spawn_match(&ctx, engine, verifier, reports.clone());
        let state = Arc::new(ConnectionState {
            game,
            codec: JsonCodec,
            handshake_timeout: Duration::from_millis(ctx.handshake_timeout_ms),
        });

        tracing::info!(room_id = %ctx.room_id, %bind_addr, "game server ready");
        let _ = reports.send(ProcessReport::Ready { bind_addr });

        let outcome = loop {
            tokio::select! {
                accepted = transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "game connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                outcome = &mut finished => break outcome,
            }
        };
        let _ = transport.shutdown().await;

        let report =
            outcome.map_err(|e| GameServerError::MatchLost(e.to_string()))?;
        let _ = reports.send(ProcessReport::Finished {
            report: report.clone(),
        });
        Ok(report)
    }
}

/// Binds and runs a game server for `ctx`.
pub async fn serve(
    ctx: HandoffContext,
    reports: mpsc::UnboundedSender<ProcessReport>,
) -> Result<ExitReport, GameServerError> {
    GameServer::bind(ctx).await?.run(reports).await
}
