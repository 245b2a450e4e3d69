//! Room registry for Parlor.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! member list and lifecycle state:
//!
//! ```text
//! Open ──(≥ min members, all ready)──→ Starting ──→ InProgress ──→ Closed
//!   ↑                                     │
//!   └──────────(spawn failure)────────────┘
//! ```
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms, routes players, one room per player
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomEvent`]: start and close notifications for the orchestrator
//! - [`RoomConfig`]: registry-wide settings (idle timeout, channel size)

mod config;
mod error;
mod registry;
mod room;

pub use config::{CODE_LEN, RoomConfig, generate_code, normalize_code};
pub use error::RoomError;
pub use registry::{CreateRoom, RoomRegistry};
pub use room::{PlayerSender, RoomEvent, RoomHandle, StartRequest};
