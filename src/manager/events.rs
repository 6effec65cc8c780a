//! Registration event handler: translates externally-delivered
//! registration events into registry operations.
//!
//! Transport-agnostic — the admin surface happens to deliver these over
//! HTTP, but nothing here assumes that. Registry failures are logged with
//! the offending identity and never propagate: the event source always
//! gets a clean acknowledgment path.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::manager::registry::{BotRegistry, RestartOutcome, StartOutcome};
use crate::storage::db::BotRecord;

/// Wire shape of a registered/updated bot, as posted by the registration
/// gateway. Field names follow the gateway's JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotPayload {
    /// Storage id, when the gateway includes it
    #[serde(default)]
    pub id: Option<String>,
    pub agent_id: String,
    pub email: String,
    #[serde(default)]
    pub bot_name: String,
    pub bot_token: String,
    #[serde(default)]
    pub bot_username: Option<String>,
    #[serde(default)]
    pub registered_by: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub registered_at: Option<String>,
}

fn default_active() -> bool {
    true
}

impl BotPayload {
    /// Identity this payload refers to: username when known, storage id
    /// otherwise (same policy as [`BotRecord::identity`]).
    pub fn identity(&self) -> Option<&str> {
        self.bot_username
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.id.as_deref())
    }

    pub fn into_record(self) -> BotRecord {
        BotRecord {
            storage_id: self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            agent_id: self.agent_id,
            email: self.email,
            bot_name: self.bot_name,
            token: self.bot_token,
            username: self.bot_username.filter(|u| !u.is_empty()),
            registered_by: self.registered_by,
            active: self.is_active,
            registered_at: self.registered_at.unwrap_or_default(),
        }
    }
}

/// Wire shape of a deactivation notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivationPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub bot_username: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl DeactivationPayload {
    pub fn identity(&self) -> Option<&str> {
        self.bot_username
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.id.as_deref())
    }
}

/// The three registration events, tagged the way the gateway posts them:
/// `{"action": "bot_registered", "botData": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "botData", rename_all = "snake_case")]
pub enum RegistrationEvent {
    BotRegistered(BotPayload),
    BotDeactivated(DeactivationPayload),
    BotUpdated(BotPayload),
}

/// Applies registration events to the registry.
pub struct EventHandler {
    registry: Arc<BotRegistry>,
}

impl EventHandler {
    pub fn new(registry: Arc<BotRegistry>) -> Self {
        Self { registry }
    }

    /// Apply one event. Never fails; the returned message is operator
    /// information only (failures are visible through logs and stats,
    /// not through the transport).
    pub async fn handle(&self, event: RegistrationEvent) -> String {
        match event {
            RegistrationEvent::BotRegistered(payload) => {
                let record = payload.into_record();
                let identity = record.identity().to_string();
                log::info!("🆕 Registration event for '{}'", identity);

                if !record.active {
                    log::warn!("Registered record '{}' is inactive; not starting", identity);
                    return format!("Bot '{}' registered inactive; not started", identity);
                }

                match self.registry.start(&record).await {
                    Ok(StartOutcome::Started) => format!("Bot '{}' started", identity),
                    Ok(StartOutcome::AlreadyRunning) => format!("Bot '{}' already running", identity),
                    Err(e) => {
                        // Already logged with category by the registry.
                        format!("Bot '{}' failed to start: [{}] {}", identity, e.kind(), e)
                    }
                }
            }
            RegistrationEvent::BotDeactivated(payload) => {
                let Some(identity) = payload.identity().map(str::to_string) else {
                    log::warn!("Deactivation event without an identity; ignoring");
                    return "Deactivation ignored: no identity".to_string();
                };
                log::info!("🔄 Deactivation event for '{}'", identity);

                if self.registry.stop(&identity).await {
                    format!("Bot '{}' stopped", identity)
                } else {
                    format!("Bot '{}' was not running", identity)
                }
            }
            RegistrationEvent::BotUpdated(payload) => {
                let Some(identity) = payload.identity().map(str::to_string) else {
                    log::warn!("Update event without an identity; ignoring");
                    return "Update ignored: no identity".to_string();
                };
                log::info!("🔄 Update event for '{}'; restarting", identity);

                // Token or behavior changes need a full stop/start cycle:
                // the controller and client were bound together at start.
                match self.registry.restart(&identity).await {
                    Ok(RestartOutcome::Restarted) => format!("Bot '{}' restarted", identity),
                    Ok(RestartOutcome::Stopped) => format!("Bot '{}' no longer active; stopped", identity),
                    Err(e) => format!("Bot '{}' failed to restart: [{}] {}", identity, e.kind(), e),
                }
            }
        }
    }
}
