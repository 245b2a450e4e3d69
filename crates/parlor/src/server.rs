//! `LobbyServer` builder and server loop.
//!
//! This is the entry point for running a Parlor lobby. It ties together
//! all the layers: transport → protocol → session → room → supervisor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parlor_gameserver::InProcessLauncher;
use parlor_protocol::{JsonCodec, PlayerId};
use parlor_room::{PlayerSender, RoomEvent, RoomRegistry};
use parlor_session::{SessionManager, TokenAuthority};
use parlor_supervisor::{Launcher, Supervisor};
use parlor_transport::{TcpTransport, Transport};
use tokio::sync::{Mutex, mpsc};

use crate::handler::handle_connection;
use crate::invites::InviteBook;
use crate::orchestrator::run_orchestrator;
use crate::{Catalog, LobbyConfig, ParlorError};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The room
/// registry locks its own index and never holds it while a room actor
/// works; the other stores sit behind their own mutex.
pub(crate) struct ServerState<C: Catalog> {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) rooms: RoomRegistry,
    pub(crate) tokens: Mutex<TokenAuthority>,
    pub(crate) invites: Mutex<InviteBook>,
    /// Event queue of every logged-in player, for pushes outside a room.
    pub(crate) inboxes: Mutex<HashMap<PlayerId, PlayerSender>>,
    pub(crate) supervisor: Supervisor,
    pub(crate) catalog: C,
    pub(crate) codec: JsonCodec,
    pub(crate) config: LobbyConfig,
}

/// Builder for configuring and starting a lobby.
///
/// # Example
///
/// ```rust,ignore
/// use parlor::prelude::*;
///
/// let server = LobbyServerBuilder::new()
///     .bind("0.0.0.0:7000")
///     .launcher(Arc::new(CommandLauncher::new("parlor-game")))
///     .build(StoreClient::new("127.0.0.1:7100"))
///     .await?;
/// server.run().await
/// ```
pub struct LobbyServerBuilder {
    bind_addr: String,
    config: LobbyConfig,
    launcher: Option<Arc<dyn Launcher>>,
}

impl LobbyServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:7000".to_string(),
            config: LobbyConfig::default(),
            launcher: None,
        }
    }

    /// Sets the address to bind the lobby to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn config(mut self, config: LobbyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how game servers are started. Defaults to running them
    /// in-process.
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Binds the listener and assembles the lobby around `catalog`.
    pub async fn build<C: Catalog>(
        self,
        catalog: C,
    ) -> Result<LobbyServer<C>, ParlorError> {
        let transport =
            TcpTransport::bind_with(&self.bind_addr, self.config.frame).await?;
        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(InProcessLauncher));
        let (rooms, events) = RoomRegistry::new(self.config.rooms.clone());

        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new()),
            rooms,
            tokens: Mutex::new(TokenAuthority::new(self.config.tokens.clone())),
            invites: Mutex::new(InviteBook::default()),
            inboxes: Mutex::new(HashMap::new()),
            supervisor: Supervisor::new(launcher, self.config.supervisor.clone()),
            catalog,
            codec: JsonCodec,
            config: self.config,
        });
        Ok(LobbyServer {
            transport,
            state,
            events,
        })
    }
}

impl Default for LobbyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Parlor lobby.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct LobbyServer<C: Catalog> {
    transport: TcpTransport,
    state: Arc<ServerState<C>>,
    events: mpsc::UnboundedReceiver<RoomEvent>,
}

impl<C: Catalog> LobbyServer<C> {
    /// Creates a new builder.
    pub fn builder() -> LobbyServerBuilder {
        LobbyServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), ParlorError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then aborts every
    /// game server and closes every room.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ParlorError> {
        tracing::info!("Parlor lobby running");
        let orchestrator =
            tokio::spawn(run_orchestrator(Arc::clone(&self.state), self.events));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("Parlor lobby shutting down");
        let aborted = self.state.supervisor.abort_all().await;
        self.state.rooms.close_all("server shutting down").await;
        orchestrator.abort();
        let _ = self.transport.shutdown().await;
        tracing::info!(aborted, "Parlor lobby stopped");
        Ok(())
    }
}
