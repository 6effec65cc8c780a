//! Core utilities, configuration, and common functionality

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use error::{BotError, BotResult};
pub use logging::{init_logger, log_startup_configuration};
