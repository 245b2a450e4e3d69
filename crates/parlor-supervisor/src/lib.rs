//! Game process supervisor for Parlor.
//!
//! When a room starts, the lobby asks the [`Supervisor`] for a game
//! server. The supervisor hands the process its [`HandoffContext`]
//! (through a [`Launcher`]), watches its reports, and turns whatever
//! happens to it into exactly one [`ExitReport`]:
//!
//! ```text
//! spawn ──→ Starting ──Ready──→ Ready ──Progress──→ Running ──exit──→ Exited
//!              │                                                ↑
//!              └──────────────── exit / crash ──────────────────┘
//! ```
//!
//! A process that dies without a final report still produces one,
//! marked `Crashed` and incomplete, built from its last progress.
//!
//! [`HandoffContext`]: parlor_protocol::HandoffContext
//! [`ExitReport`]: parlor_protocol::ExitReport

mod error;
mod launcher;
mod supervisor;

pub use error::SupervisorError;
pub use launcher::{CommandLauncher, LaunchedProcess, Launcher};
pub use supervisor::{
    GameProcessHandle, ProcessHealth, Supervisor, SupervisorConfig,
};
