//! Identity and credentials for Parlor.
//!
//! This crate covers the two things the core knows about *who* a player
//! is:
//!
//! 1. **Lobby login**: credentials are checked by an [`Authenticator`]
//!    and the resulting login is tracked by the [`SessionManager`]
//!    (one session per account).
//! 2. **Room tokens**: once a room's game server is up, the
//!    [`TokenAuthority`] mints one short-lived [`RoomToken`] per member,
//!    and the game server checks them with a [`TokenVerifier`] built from
//!    the key it was handed.
//!
//! ```text
//! Lobby (above)      ← logs players in, hands out room tokens
//!     ↕
//! Session (this crate)
//!     ↕
//! Protocol (below)   ← PlayerId, RoomId, ErrorCode
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;
mod token;

pub use auth::{Authenticator, Identity};
pub use error::{SessionError, TokenError};
pub use manager::SessionManager;
pub use session::Session;
pub use token::{
    RoomToken, SigningKey, TokenAuthority, TokenConfig, TokenGrant,
    TokenVerifier, now_ms,
};
