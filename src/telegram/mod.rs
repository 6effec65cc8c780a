//! Telegram client adapter and controller wiring

pub mod adapter;
pub mod controller;

// Re-exports for convenience
pub use adapter::{categorize_request_error, validate_token_format, BotClient, ClientFactory, SelfInfo, TelegramBotClient, TelegramClientFactory};
pub use controller::{default_controller, ControllerAttach, HandlerError};
