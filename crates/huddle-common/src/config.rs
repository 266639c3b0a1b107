//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > config file > defaults
//!
//! Environment variables use the `HUDDLE` prefix and `__` as the nesting
//! separator, e.g. `HUDDLE__SERVER__PORT=5000` or
//! `HUDDLE__AUTH__JWT_SECRET=...`.

use serde::Deserialize;
use std::path::Path;

/// Load configuration from defaults, an optional config file and the environment.
///
/// When `file` is `None`, a `config.{toml,yaml,json}` in the working directory
/// is picked up if present.
pub fn load(file: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let file_source = match file {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name("config").required(false),
    };

    config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 5000)?
        .set_default("server.frontend_url", "http://localhost:3000")?
        .set_default("signaling.room_prefix", "video-room-")?
        .set_default("signaling.outbox_capacity", 256)?
        .set_default("signaling.heartbeat_interval_secs", 25)?
        .set_default("signaling.idle_timeout_secs", 60)?
        .set_default("signaling.max_frame_bytes", 65_536)?
        .set_default("limits.max_signal_bytes", 32_768)?
        .set_default("limits.max_chat_length", 2000)?
        .set_default("limits.max_participants_per_room", 50)?
        .add_source(file_source)
        .add_source(
            config::Environment::with_prefix("HUDDLE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<AppConfig>()
        .and_then(|config| {
            config.ensure_consistent()?;
            Ok(config)
        })
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub signaling: SignalingConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Reject settings that deserialize fine but cannot work together.
    pub fn ensure_consistent(&self) -> Result<(), config::ConfigError> {
        let signaling = &self.signaling;
        if signaling.heartbeat_interval_secs >= signaling.idle_timeout_secs {
            return Err(config::ConfigError::Message(format!(
                "signaling.heartbeat_interval_secs ({}) must be less than signaling.idle_timeout_secs ({})",
                signaling.heartbeat_interval_secs, signaling.idle_timeout_secs
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS. `*` allows any origin.
    pub frontend_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignalingConfig {
    /// Prepended to a project id to form its room id.
    pub room_prefix: String,
    /// Bounded size of each connection's outbound event queue.
    pub outbox_capacity: usize,
    /// Interval between WebSocket pings sent by the server.
    pub heartbeat_interval_secs: u64,
    /// A connection with no inbound frame for this long is closed.
    pub idle_timeout_secs: u64,
    pub max_frame_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Serialized size cap for a relayed offer/answer/candidate body.
    pub max_signal_bytes: usize,
    /// Chat message cap, in characters.
    pub max_chat_length: usize,
    pub max_participants_per_room: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret shared with the REST API. When set, every room join must
    /// carry a token whose `id` claim matches the asserted user id.
    pub jwt_secret: Option<String>,
}
