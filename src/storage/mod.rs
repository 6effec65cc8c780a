//! Bot record persistence

pub mod db;

// Re-exports for convenience
pub use db::{create_pool, get_connection, BotRecord, BotRecordStore, DbConnection, DbPool, SqliteBotStore};
