//! Telegram client adapter
//!
//! This module contains:
//! - The `BotClient`/`ClientFactory` seams the instance registry runs against
//! - The teloxide-backed implementation (get_me handshake, polling dispatcher)
//! - Token format pre-flight and API error categorization

use async_trait::async_trait;
use reqwest::ClientBuilder;
use std::any::Any;
use std::sync::{Arc, Mutex as StdMutex};
use teloxide::update_listeners::Polling;
use teloxide::dispatching::ShutdownToken;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::config;
use crate::core::error::{BotError, BotResult};
use crate::telegram::controller::HandlerError;

/// Identity a bot reports for itself via `getMe`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfInfo {
    pub id: i64,
    pub username: Option<String>,
}

/// A single running (or startable) bot client.
///
/// Exclusively owned by the registry entry that created it; `start` must
/// resolve only once the session is actually accepted or rejected by the
/// platform, so the registry's bounded wait is meaningful.
#[async_trait]
pub trait BotClient: Send + Sync {
    /// Connect and begin receiving updates.
    async fn start(&self) -> BotResult<()>;

    /// Tear down the update loop. Idempotent.
    async fn stop(&self) -> BotResult<()>;

    /// Ask the platform who this token belongs to.
    async fn self_info(&self) -> BotResult<SelfInfo>;

    /// Send a plain text message to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> BotResult<()>;

    /// Concrete-type access for controller attachments.
    fn as_any(&self) -> &dyn Any;
}

/// Builds a client from a raw token. No network traffic happens here;
/// the handshake is deferred to [`BotClient::start`].
pub trait ClientFactory: Send + Sync {
    fn build(&self, token: &str) -> BotResult<Arc<dyn BotClient>>;
}

/// Cheap shape check for a bot token: numeric id, separator, secret.
///
/// Catches copy-paste accidents before any network call; real validation
/// is the `getMe` handshake.
pub fn validate_token_format(token: &str) -> BotResult<()> {
    let Some((id, secret)) = token.split_once(':') else {
        return Err(BotError::TokenFormat("missing ':' separator".to_string()));
    };
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BotError::TokenFormat("bot id prefix must be numeric".to_string()));
    }
    if secret.len() < 16 {
        return Err(BotError::TokenFormat("secret part is too short".to_string()));
    }
    Ok(())
}

/// Map a teloxide request error onto the host's failure taxonomy.
///
/// 401/404-style rejections mean the credential is bad until the record
/// is corrected; a 409 means another process holds the session; reqwest
/// transport errors (DNS, refused connections) are transient.
pub fn categorize_request_error(err: teloxide::RequestError) -> BotError {
    use teloxide::{ApiError, RequestError};

    match err {
        RequestError::Api(api) => {
            let msg = api.to_string();
            if matches!(api, ApiError::TerminatedByOtherGetUpdates) || msg.contains("Conflict") {
                BotError::SessionConflict(msg)
            } else if msg.contains("Unauthorized") || msg.contains("Not Found") || msg.contains("token") {
                BotError::AuthRejected(msg)
            } else {
                BotError::Telegram(RequestError::Api(api))
            }
        }
        RequestError::Network(e) => BotError::Network(e.to_string()),
        other => BotError::Telegram(other),
    }
}

struct RunningDispatcher {
    shutdown: ShutdownToken,
    join: JoinHandle<()>,
}

/// teloxide-backed [`BotClient`].
///
/// `start` verifies the token with `getMe`, then spawns a long-polling
/// dispatcher (dropping pending updates, so a restarted bot doesn't
/// replay a backlog accumulated while it was down).
pub struct TelegramBotClient {
    bot: Bot,
    /// Short label for log lines; the token's numeric prefix until the
    /// real username is known.
    label: String,
    /// Handler tree installed by the controller attachment before start.
    schema: StdMutex<Option<teloxide::dispatching::UpdateHandler<HandlerError>>>,
    running: Mutex<Option<RunningDispatcher>>,
}

impl TelegramBotClient {
    fn new(bot: Bot, label: String) -> Self {
        Self {
            bot,
            label,
            schema: StdMutex::new(None),
            running: Mutex::new(None),
        }
    }

    /// The underlying teloxide bot, for controllers that need the raw API.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Install the dispatcher handler tree. Must happen before `start`;
    /// a later call has no effect on a running dispatcher.
    pub fn set_schema(&self, schema: teloxide::dispatching::UpdateHandler<HandlerError>) {
        if let Ok(mut slot) = self.schema.lock() {
            *slot = Some(schema);
        }
    }
}

#[async_trait]
impl BotClient for TelegramBotClient {
    async fn start(&self) -> BotResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        // Handshake: proves the token is accepted before we commit to a
        // polling session.
        let me = self.bot.get_me().await.map_err(categorize_request_error)?;
        let label = me.username.clone().unwrap_or_else(|| self.label.clone());

        let handler = self
            .schema
            .lock()
            .map_err(|_| BotError::Attachment("schema slot poisoned".to_string()))?
            .take()
            .unwrap_or_else(dptree::entry);

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .default_handler(|_| async {})
            .error_handler(LoggingErrorHandler::with_custom_text(format!(
                "[@{}] handler error",
                label
            )))
            .build();

        let shutdown = dispatcher.shutdown_token();
        let bot = self.bot.clone();
        let listener_label = label.clone();
        let join = tokio::spawn(async move {
            let listener = Polling::builder(bot).drop_pending_updates().build();
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text(format!(
                        "[@{}] update listener error",
                        listener_label
                    )),
                )
                .await;
            log::info!("Dispatcher for @{} finished", listener_label);
        });

        *running = Some(RunningDispatcher { shutdown, join });
        Ok(())
    }

    async fn stop(&self) -> BotResult<()> {
        let Some(dispatcher) = self.running.lock().await.take() else {
            return Ok(());
        };

        match dispatcher.shutdown.shutdown() {
            Ok(wait) => wait.await,
            Err(_) => {
                // Dispatcher never reached the dispatch loop; kill the task.
                dispatcher.join.abort();
            }
        }
        Ok(())
    }

    async fn self_info(&self) -> BotResult<SelfInfo> {
        let me = self.bot.get_me().await.map_err(categorize_request_error)?;
        Ok(SelfInfo {
            id: me.id.0 as i64,
            username: me.username.clone(),
        })
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> BotResult<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(categorize_request_error)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds [`TelegramBotClient`]s with a timeout-configured HTTP client
/// and an optional custom Bot API base URL (local Bot API server).
pub struct TelegramClientFactory;

impl TelegramClientFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TelegramClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for TelegramClientFactory {
    fn build(&self, token: &str) -> BotResult<Arc<dyn BotClient>> {
        let http = ClientBuilder::new()
            .timeout(config::network::timeout())
            .build()
            .map_err(|e| BotError::Network(e.to_string()))?;

        let mut bot = Bot::with_client(token, http);
        if let Some(ref api_url) = *config::BOT_API_URL {
            let url = url::Url::parse(api_url)
                .map_err(|e| BotError::Network(format!("invalid BOT_API_URL: {}", e)))?;
            bot = bot.set_api_url(url);
        }

        let label = token.split(':').next().unwrap_or("bot").to_string();
        Ok(Arc::new(TelegramBotClient::new(bot, label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_format_accepts_wellformed() {
        assert!(validate_token_format("1234567890:AAEhBOweik6ad9r_QXMENQjcrGbqCr4K-5c").is_ok());
        assert!(validate_token_format("1:sixteen-chars-ok").is_ok());
    }

    #[test]
    fn test_token_format_rejects_missing_separator() {
        let err = validate_token_format("1234567890AAEhBOweik6ad9r").unwrap_err();
        assert_eq!(err.kind(), "format");
    }

    #[test]
    fn test_token_format_rejects_non_numeric_prefix() {
        let err = validate_token_format("abc:AAEhBOweik6ad9r_QXMENQ").unwrap_err();
        assert_eq!(err.kind(), "format");
    }

    #[test]
    fn test_token_format_rejects_short_secret() {
        let err = validate_token_format("1234567890:short").unwrap_err();
        assert_eq!(err.kind(), "format");
    }

    #[test]
    fn test_categorize_conflict() {
        let err = categorize_request_error(teloxide::RequestError::Api(
            teloxide::ApiError::TerminatedByOtherGetUpdates,
        ));
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_categorize_unknown_api_error_stays_telegram() {
        let err = categorize_request_error(teloxide::RequestError::Api(teloxide::ApiError::Unknown(
            "Something else".to_string(),
        )));
        assert_eq!(err.kind(), "telegram");
    }

    #[test]
    fn test_categorize_unauthorized_is_auth() {
        let err = categorize_request_error(teloxide::RequestError::Api(teloxide::ApiError::Unknown(
            "Unauthorized".to_string(),
        )));
        assert_eq!(err.kind(), "auth");
    }

    #[test]
    fn test_factory_builds_without_network() {
        let factory = TelegramClientFactory::new();
        let client = factory.build("1234567890:AAEhBOweik6ad9r_QXMENQ").unwrap();
        assert!(client.as_any().downcast_ref::<TelegramBotClient>().is_some());
    }
}
