//! Authoritative per-room game server for Parlor.
//!
//! A game server is started by the supervisor with a
//! [`HandoffContext`](parlor_protocol::HandoffContext) and nothing else.
//! It binds its own listener, admits exactly the room's members by their
//! one-time room tokens, runs the match through
//! [`parlor_turns::MatchEngine`], and reports back:
//!
//! ```text
//! Ready { bind_addr } → Progress { round, scores }* → Finished { report }
//! ```
//!
//! Inside, one match actor owns the engine and the round clock; each
//! client connection is a task that forwards requests to it and drains
//! its own event channel.

mod error;
mod game;
mod handler;
mod launcher;
mod reports;
mod server;

pub use error::GameServerError;
pub use launcher::InProcessLauncher;
pub use reports::forward_reports;
pub use server::{GameServer, serve};
