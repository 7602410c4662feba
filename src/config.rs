//! Environment-variable configuration
//!
//! Every knob has a default matching the reference behavior; malformed
//! values fall back to the default with a warning rather than aborting
//! startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::rate_limit::{DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW};

/// Default heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Runtime configuration, read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket listen address (`CHAT_WS_ADDR`)
    pub ws_addr: String,
    /// Diagnostics HTTP listen address (`CHAT_HTTP_ADDR`)
    pub http_addr: String,
    /// History ring capacity (`CHAT_HISTORY_CAPACITY`)
    pub history_capacity: usize,
    /// Rate limit: messages per window (`CHAT_RATE_LIMIT_MAX`)
    pub rate_limit_max: u32,
    /// Rate limit window (`CHAT_RATE_LIMIT_WINDOW_MS`)
    pub rate_limit_window: Duration,
    /// Heartbeat period (`CHAT_HEARTBEAT_INTERVAL_MS`)
    pub heartbeat_interval: Duration,
    /// Evict connections that miss a heartbeat round
    /// (`CHAT_EVICT_UNRESPONSIVE`, off by default: liveness is advisory)
    pub evict_unresponsive: bool,
}

impl Config {
    /// Load configuration from the environment
    pub fn from_env() -> Self {
        Self {
            ws_addr: env::var("CHAT_WS_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            http_addr: env::var("CHAT_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8081".to_string()),
            history_capacity: env_parse("CHAT_HISTORY_CAPACITY", DEFAULT_HISTORY_CAPACITY),
            rate_limit_max: env_parse("CHAT_RATE_LIMIT_MAX", DEFAULT_RATE_LIMIT_MAX),
            rate_limit_window: Duration::from_millis(env_parse(
                "CHAT_RATE_LIMIT_WINDOW_MS",
                DEFAULT_RATE_LIMIT_WINDOW.as_millis() as u64,
            )),
            heartbeat_interval: Duration::from_millis(env_parse(
                "CHAT_HEARTBEAT_INTERVAL_MS",
                DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            )),
            evict_unresponsive: env_flag("CHAT_EVICT_UNRESPONSIVE"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_addr: "127.0.0.1:8080".to_string(),
            http_addr: "127.0.0.1:8081".to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            evict_unresponsive: false,
        }
    }
}

/// Parse an env var, falling back to `default` on absence or bad input
fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: {:?}, using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Boolean env flag: set to "1" or "true" (any case) to enable
fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
