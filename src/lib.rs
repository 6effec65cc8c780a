//! Botfleet - dynamic multi-tenant Telegram bot host
//!
//! Boots an arbitrary number of independently-tokened bot instances from
//! records in a database, supervises their lifecycle at runtime, and
//! reacts to registration webhooks from a separate gateway process.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging
//! - `storage`: the bot record store (SQLite)
//! - `manager`: instance registry, bootstrap, event handling, per-bot scheduling
//! - `telegram`: client adapter seams and the teloxide implementation
//! - `web`: admin/webhook HTTP surface

pub mod cli;
pub mod core;
pub mod manager;
pub mod storage;
pub mod telegram;
pub mod web;

// Re-export commonly used types for convenience
pub use crate::core::{config, BotError, BotResult};
pub use crate::manager::{initialize_bots, BotRegistry, EventHandler, RegistrationEvent, SchedulerHandle, StartupReport};
pub use crate::storage::{BotRecord, BotRecordStore, SqliteBotStore};
pub use crate::telegram::{BotClient, ClientFactory, TelegramClientFactory};
