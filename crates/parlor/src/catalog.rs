//! Catalog/account gateway: the lobby's view of the external store.
//!
//! Accounts, published games and match history live in an external
//! store. The lobby needs three things from it: check a login, look up a
//! game, and record a finished match. [`Catalog`] is that seam;
//! [`StoreClient`] speaks to the real store over framed TCP and
//! [`MemoryCatalog`] keeps everything in memory for tests and local runs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parlor_protocol::{
    Codec, ErrorCode, ExitReport, GameId, HandoffMember, JsonCodec, PlayerId,
    ProtocolError, StoreRequest, StoreResponse,
};
use parlor_session::{Authenticator, Identity, SessionError};
use parlor_transport::{Connection, FrameConfig, TcpConnection, TransportError};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A published game, as far as the lobby cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub game_id: GameId,
    #[serde(default)]
    pub name: String,
    pub min_players: usize,
    pub max_players: usize,
    /// Unpublished games cannot be hosted.
    #[serde(default = "published_default")]
    pub published: bool,
    /// Default game config; room config is merged over it.
    #[serde(default)]
    pub config: serde_json::Value,
}

fn published_default() -> bool {
    true
}

impl GameInfo {
    pub fn new(game_id: impl Into<GameId>, min_players: usize, max_players: usize) -> Self {
        let game_id = game_id.into();
        Self {
            name: game_id.to_string(),
            game_id,
            min_players,
            max_players,
            published: true,
            config: serde_json::Value::Null,
        }
    }
}

/// A finished match, as written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Members in join order.
    pub players: Vec<HandoffMember>,
    pub report: ExitReport,
    pub finished_at_ms: u64,
}

/// Errors from talking to the store.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("store unreachable: {0}")]
    Unreachable(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("store closed the connection without answering")]
    NoResponse,

    #[error("store rejected {entity}/{action}: {message}")]
    Rejected {
        entity: String,
        action: String,
        message: String,
    },

    #[error("unexpected store result: {0}")]
    BadResult(String),
}

impl CatalogError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) | Self::NoResponse => {
                ErrorCode::Unavailable
            }
            _ => ErrorCode::Internal,
        }
    }
}

/// Accounts and games. Also authenticates lobby logins.
pub trait Catalog: Authenticator {
    /// Looks up a game. `Ok(None)` if it does not exist.
    fn game(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<Option<GameInfo>, CatalogError>> + Send;

    /// Persists a finished match.
    fn record_result(
        &self,
        record: &MatchRecord,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;
}

impl<T: Catalog> Catalog for Arc<T> {
    fn game(
        &self,
        game_id: &GameId,
    ) -> impl Future<Output = Result<Option<GameInfo>, CatalogError>> + Send {
        (**self).game(game_id)
    }

    fn record_result(
        &self,
        record: &MatchRecord,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send {
        (**self).record_result(record)
    }
}

// ---------------------------------------------------------------------------
// StoreClient
// ---------------------------------------------------------------------------

/// Talks to the external store: one framed connection, one request, one
/// response per call.
#[derive(Debug, Clone)]
pub struct StoreClient {
    addr: String,
    frame: FrameConfig,
    timeout: Duration,
}

#[derive(Deserialize)]
struct LoginResult {
    player_id: PlayerId,
    username: String,
}

impl StoreClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            frame: FrameConfig::default(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Bounds each whole call. Default: 5 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one request and returns the `result` of a successful answer.
    pub async fn call(
        &self,
        request: StoreRequest,
    ) -> Result<serde_json::Value, CatalogError> {
        let entity = request.entity.clone();
        let action = request.action.clone();
        let response = tokio::time::timeout(self.timeout, self.exchange(&request))
            .await
            .map_err(|_| CatalogError::Timeout(self.timeout))??;

        if response.ok {
            Ok(response.result)
        } else {
            Err(CatalogError::Rejected {
                entity,
                action,
                message: response.error.unwrap_or_default(),
            })
        }
    }

    async fn exchange(
        &self,
        request: &StoreRequest,
    ) -> Result<StoreResponse, CatalogError> {
        let conn = TcpConnection::connect(&self.addr, self.frame).await?;
        conn.send(&JsonCodec.encode(request)?).await?;
        let data = conn.recv().await?.ok_or(CatalogError::NoResponse)?;
        let _ = conn.close().await;
        Ok(JsonCodec.decode(&data)?)
    }
}

impl Authenticator for StoreClient {
    async fn authenticate(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Identity, SessionError> {
        let request = StoreRequest::new(
            "PlayerAccount",
            "login",
            serde_json::json!({
                "username": username,
                "password_hash": password_hash,
            }),
        );
        let result = match self.call(request).await {
            Ok(result) => result,
            Err(CatalogError::Rejected { message, .. }) => {
                return Err(SessionError::AuthFailed(message));
            }
            Err(e) => return Err(SessionError::Backend(e.to_string())),
        };
        let login: LoginResult = serde_json::from_value(result)
            .map_err(|e| SessionError::Backend(e.to_string()))?;
        Ok(Identity {
            player_id: login.player_id,
            username: login.username,
        })
    }
}

impl Catalog for StoreClient {
    async fn game(
        &self,
        game_id: &GameId,
    ) -> Result<Option<GameInfo>, CatalogError> {
        let request = StoreRequest::new(
            "Game",
            "read",
            serde_json::json!({ "id": game_id }),
        );
        let result = self.call(request).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| CatalogError::BadResult(e.to_string()))
    }

    async fn record_result(&self, record: &MatchRecord) -> Result<(), CatalogError> {
        let data = serde_json::to_value(record)
            .map_err(|e| CatalogError::BadResult(e.to_string()))?;
        self.call(StoreRequest::new("Match", "record", data)).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

struct Account {
    player_id: PlayerId,
    password_hash: String,
}

/// In-memory catalog for tests and single-process runs.
///
/// ```rust
/// use parlor::{GameInfo, MemoryCatalog};
///
/// let catalog = MemoryCatalog::new()
///     .with_account("ann", "hash-a")
///     .with_game(GameInfo::new("rps", 2, 4));
/// ```
#[derive(Default)]
pub struct MemoryCatalog {
    accounts: Mutex<HashMap<String, Account>>,
    games: Mutex<HashMap<GameId, GameInfo>>,
    results: Mutex<Vec<MatchRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account. Player ids are assigned in insertion order,
    /// starting at 1.
    pub fn with_account(mut self, username: &str, password_hash: &str) -> Self {
        let accounts = self.accounts.get_mut();
        let player_id = PlayerId(accounts.len() as u64 + 1);
        accounts.insert(
            username.to_string(),
            Account {
                player_id,
                password_hash: password_hash.to_string(),
            },
        );
        self
    }

    pub fn with_game(mut self, game: GameInfo) -> Self {
        self.games.get_mut().insert(game.game_id.clone(), game);
        self
    }

    /// Every match recorded so far, oldest first.
    pub async fn results(&self) -> Vec<MatchRecord> {
        self.results.lock().await.clone()
    }
}

impl Authenticator for MemoryCatalog {
    async fn authenticate(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Identity, SessionError> {
        let accounts = self.accounts.lock().await;
        match accounts.get(username) {
            Some(account) if account.password_hash == password_hash => {
                Ok(Identity {
                    player_id: account.player_id,
                    username: username.to_string(),
                })
            }
            _ => Err(SessionError::AuthFailed(
                "unknown user or wrong password".into(),
            )),
        }
    }
}

impl Catalog for MemoryCatalog {
    async fn game(
        &self,
        game_id: &GameId,
    ) -> Result<Option<GameInfo>, CatalogError> {
        Ok(self.games.lock().await.get(game_id).cloned())
    }

    async fn record_result(&self, record: &MatchRecord) -> Result<(), CatalogError> {
        tracing::debug!(room_id = %record.report.room_id, "match recorded");
        self.results.lock().await.push(record.clone());
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
