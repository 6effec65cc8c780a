use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot host

/// Path to the SQLite database holding registered bot records
/// Read once at startup from BOTFLEET_DB or defaults to "botfleet.sqlite"
pub static DATABASE_PATH: Lazy<String> = Lazy::new(|| env::var("BOTFLEET_DB").unwrap_or_else(|_| "botfleet.sqlite".to_string()));

/// Path to the log file
pub static LOG_FILE_PATH: Lazy<String> = Lazy::new(|| env::var("BOTFLEET_LOG_FILE").unwrap_or_else(|_| "botfleet.log".to_string()));

/// Port for the admin/webhook HTTP surface
/// Read from WEBHOOK_PORT environment variable, defaults to 3001
/// (the registration bot posts its notifications here)
pub static WEBHOOK_PORT: Lazy<u16> = Lazy::new(|| {
    env::var("WEBHOOK_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001)
});

/// Optional custom Telegram Bot API base URL (e.g. a local Bot API server)
/// Read from BOT_API_URL environment variable
pub static BOT_API_URL: Lazy<Option<String>> = Lazy::new(|| env::var("BOT_API_URL").ok());

/// Instance manager configuration
pub mod manager {
    use super::Duration;

    /// Bounded wait for a single bot's start handshake (in seconds)
    pub const START_TIMEOUT_SECS: u64 = 30;

    /// Bounded wait for a single bot's stop (in seconds)
    pub const STOP_TIMEOUT_SECS: u64 = 10;

    /// Delay between consecutive bot starts during bootstrap (in milliseconds)
    ///
    /// The Bot API rejects near-simultaneous session starts for many bots
    /// from one process; serializing with this delay avoids the cascade.
    pub const INTER_START_DELAY_MS: u64 = 750;

    /// Timeout for the bootstrap record query (in seconds)
    pub const STORE_QUERY_TIMEOUT_SECS: u64 = 10;

    /// Start handshake timeout duration
    pub fn start_timeout() -> Duration {
        Duration::from_secs(START_TIMEOUT_SECS)
    }

    /// Stop timeout duration
    pub fn stop_timeout() -> Duration {
        Duration::from_secs(STOP_TIMEOUT_SECS)
    }

    /// Inter-start delay duration
    pub fn inter_start_delay() -> Duration {
        Duration::from_millis(INTER_START_DELAY_MS)
    }

    /// Store query timeout duration
    pub fn store_query_timeout() -> Duration {
        Duration::from_secs(STORE_QUERY_TIMEOUT_SECS)
    }
}

/// Per-bot scheduler configuration
pub mod scheduler {
    use super::Duration;

    /// Interval between greeting ticks (in seconds). One day by default;
    /// overridable via BOTFLEET_GREETING_INTERVAL_SECS so tests and staging
    /// can run the ticker at a human-observable pace.
    pub const GREETING_INTERVAL_SECS: u64 = 24 * 60 * 60;

    /// Greeting tick interval duration
    pub fn greeting_interval() -> Duration {
        let secs = std::env::var("BOTFLEET_GREETING_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(GREETING_INTERVAL_SECS);
        Duration::from_secs(secs)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Telegram HTTP requests (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}
