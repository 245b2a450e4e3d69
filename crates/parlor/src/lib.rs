//! # Parlor
//!
//! Lobby and orchestration for hosted turn-based multiplayer games.
//!
//! Players log in to the lobby, create or join rooms, and ready up. When a
//! room is ready the lobby starts a dedicated game server for it, hands each
//! member a single-use room token, and waits for the match result, which it
//! records through the [`Catalog`] before closing the room.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parlor::prelude::*;
//!
//! # async fn run() -> Result<(), ParlorError> {
//! let catalog = MemoryCatalog::new()
//!     .with_account("ann", "hash-a")
//!     .with_game(GameInfo::new("rps", 2, 4));
//!
//! let server = LobbyServerBuilder::new()
//!     .bind("0.0.0.0:7000")
//!     .build(catalog)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod catalog;
mod config;
mod error;
mod handler;
mod invites;
mod orchestrator;
mod server;

pub use catalog::{Catalog, CatalogError, GameInfo, MatchRecord, MemoryCatalog, StoreClient};
pub use config::LobbyConfig;
pub use error::ParlorError;
pub use server::{LobbyServer, LobbyServerBuilder};

/// Everything needed to stand up a lobby.
pub mod prelude {
    pub use crate::{
        Catalog, CatalogError, GameInfo, LobbyConfig, LobbyServer, LobbyServerBuilder,
        MatchRecord, MemoryCatalog, ParlorError, StoreClient,
    };
    pub use parlor_gameserver::InProcessLauncher;
    pub use parlor_protocol::{
        ActivePlayer, CompletionStatus, ErrorCode, GameId, InviteView, LobbyEvent, LobbyRequest,
        PlayerId, PlayerStatus, RoomId, RoomRef, StartPolicy,
    };
    pub use parlor_session::{Authenticator, Identity, SessionError};
    pub use parlor_supervisor::{CommandLauncher, Launcher};
}
