//! Wire protocol for Parlor.
//!
//! This crate defines every message that crosses a process or socket
//! boundary:
//!
//! - **Lobby** ([`LobbyRequest`], [`LobbyEvent`]): client ↔ lobby.
//! - **Game** ([`GameRequest`], [`GameEvent`]): client ↔ game server.
//! - **Handoff** ([`HandoffContext`], [`ProcessReport`], [`ExitReport`]):
//!   supervisor ↔ spawned game-server process.
//! - **Store** ([`StoreRequest`], [`StoreResponse`]): lobby ↔ account and
//!   catalog store.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how messages become frame bodies.
//!
//! ```text
//! Transport (frames) → Protocol (typed messages) → Lobby / Game server
//! ```

mod codec;
mod error;
mod game;
mod handoff;
mod lobby;
mod store;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use game::{
    GameEvent, GameRequest, MatchPhase, PairOutcome, PlayerAction, PlayerInfo,
};
pub use handoff::{
    ExitReport, HANDOFF_ENV, HandoffContext, HandoffMember, ProcessReport,
    StartPolicy,
};
pub use lobby::{
    ActivePlayer, InviteView, LobbyEvent, LobbyRequest, PlayerStatus, RoomRef,
};
pub use store::{StoreRequest, StoreResponse};
pub use types::{
    Action, CompletionStatus, ErrorCode, GameId, MemberView, PlayerId,
    RankEntry, RoomId, RoomSnapshot, RoomState, RoomSummary, ScoreEntry,
};
