use thiserror::Error;

/// Centralized error types for the bot host
///
/// Every failure mode of starting, stopping, or looking up a managed bot
/// is converted to this enum so callers (bootstrap, event handler, admin
/// surface) can log a categorized reason without matching on library types.
#[derive(Error, Debug)]
pub enum BotError {
    /// Token fails the cheap shape check; no network call was attempted
    #[error("Invalid token format: {0}")]
    TokenFormat(String),

    /// Telegram rejected the credential (revoked or mistyped token)
    #[error("Authorization rejected: {0}")]
    AuthRejected(String),

    /// The same token already has an active session elsewhere
    /// (another process, or a leftover webhook registration)
    #[error("Session conflict: {0}")]
    SessionConflict(String),

    /// Start or stop did not complete within the bounded wait
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// DNS/connectivity failure; transient, safe to retry via restart
    #[error("Network error: {0}")]
    Network(String),

    /// Bot record store (database) errors
    #[error("Store error: {0}")]
    Store(String),

    /// Telegram API errors that fit no narrower category
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Controller attachment failed to wire up a bot's handlers
    #[error("Controller attachment error: {0}")]
    Attachment(String),
}

impl BotError {
    /// Short categorized reason, suitable for log lines and the admin API.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::TokenFormat(_) => "format",
            BotError::AuthRejected(_) => "auth",
            BotError::SessionConflict(_) => "conflict",
            BotError::Timeout(_) => "timeout",
            BotError::Network(_) => "network",
            BotError::Store(_) => "store",
            BotError::Telegram(_) => "telegram",
            BotError::Attachment(_) => "attachment",
        }
    }
}

impl From<rusqlite::Error> for BotError {
    fn from(err: rusqlite::Error) -> Self {
        BotError::Store(err.to_string())
    }
}

impl From<r2d2::Error> for BotError {
    fn from(err: r2d2::Error) -> Self {
        BotError::Store(err.to_string())
    }
}

/// Type alias for Result with BotError
pub type BotResult<T> = Result<T, BotError>;
