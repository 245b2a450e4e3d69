//! Lobby configuration.

use std::time::Duration;

use parlor_protocol::StartPolicy;
use parlor_room::RoomConfig;
use parlor_session::TokenConfig;
use parlor_supervisor::SupervisorConfig;
use parlor_transport::FrameConfig;

/// Settings for the lobby and the game servers it starts.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Frame limits on client connections.
    pub frame: FrameConfig,

    /// Time a new connection has to authenticate. Default: 10 seconds.
    pub login_timeout: Duration,

    /// Silence after which an authenticated connection is dropped.
    /// Clients keep it alive with `Ping`. Default: 60 seconds.
    pub recv_timeout: Duration,

    pub rooms: RoomConfig,
    pub tokens: TokenConfig,
    pub supervisor: SupervisorConfig,

    /// Host game servers bind to; each picks its own port.
    pub game_host: String,
    pub start_policy: StartPolicy,
    pub round_deadline: Duration,
    /// Handshake timeout inside the game server.
    pub game_handshake_timeout: Duration,
    /// How long a game server waits for its players to show up.
    pub game_start_timeout: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            login_timeout: Duration::from_secs(10),
            recv_timeout: Duration::from_secs(60),
            rooms: RoomConfig::default(),
            tokens: TokenConfig::default(),
            supervisor: SupervisorConfig::default(),
            game_host: "127.0.0.1".to_string(),
            start_policy: StartPolicy::AllReady,
            round_deadline: Duration::from_secs(15),
            game_handshake_timeout: Duration::from_secs(5),
            game_start_timeout: Duration::from_secs(30),
        }
    }
}

/// Clamps requested player bounds into a game's catalog bounds.
///
/// Missing values take the game's bound; `max` never drops below `min`.
pub(crate) fn clamp_bounds(
    requested_min: Option<usize>,
    requested_max: Option<usize>,
    game_min: usize,
    game_max: usize,
) -> (usize, usize) {
    let game_min = game_min.max(1);
    let game_max = game_max.max(game_min);
    let min = requested_min.unwrap_or(game_min).clamp(game_min, game_max);
    let max = requested_max.unwrap_or(game_max).clamp(min, game_max);
    (min, max)
}

/// Overlays the room's config on the game's default config. Objects merge
/// key by key; anything else replaces the default unless it is null.
pub(crate) fn merge_config(
    defaults: &serde_json::Value,
    requested: serde_json::Value,
) -> serde_json::Value {
    match (defaults, requested) {
        (serde_json::Value::Object(base), serde_json::Value::Object(over)) => {
            let mut merged = base.clone();
            merged.extend(over);
            serde_json::Value::Object(merged)
        }
        (base, serde_json::Value::Null) => base.clone(),
        (_, over) => over,
    }
}
