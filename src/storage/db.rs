//! SQLite-backed bot record store.
//!
//! The registration gateway writes bot records here; this process reads
//! the active ones at bootstrap and re-reads individual records on
//! restart. Shape validation happens at this boundary, not inside the
//! registry.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use crate::core::error::{BotError, BotResult};

/// A registered bot, as persisted by the registration gateway.
///
/// Pass-through fields (`agent_id`, `email`, `bot_name`, `registered_by`)
/// are forwarded to the controller attachment untouched; the registry
/// itself only interprets `token`, `username`/`storage_id` and `active`.
#[derive(Debug, Clone)]
pub struct BotRecord {
    /// Storage identifier, assigned at insert time
    pub storage_id: String,
    /// Owning agent's identifier
    pub agent_id: String,
    /// Owner contact email
    pub email: String,
    /// Human-readable bot name
    pub bot_name: String,
    /// Bot API token ("digits:secret")
    pub token: String,
    /// Public @username, once known
    pub username: Option<String>,
    /// Telegram user id of whoever registered the bot
    pub registered_by: i64,
    /// Only active records are eligible for bootstrap start
    pub active: bool,
    /// Registration timestamp (ISO-8601)
    pub registered_at: String,
}

impl BotRecord {
    /// Canonical registry key: the public username when known, the
    /// storage id otherwise. Fixed at the moment a record is loaded;
    /// a later username backfill takes effect on the next restart.
    pub fn identity(&self) -> &str {
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => u,
            _ => &self.storage_id,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and runs
/// schema migrations on the first connection.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    let conn = pool.get()?;
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
        // Don't fail on migration errors, as they might be expected
    }

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Migrate database schema to ensure all required columns exist
///
/// Creates the `bots` table if missing and safely adds columns that
/// older databases lack.
fn migrate_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bots (
            id TEXT PRIMARY KEY,
            agent_id TEXT NOT NULL,
            email TEXT NOT NULL,
            bot_name TEXT NOT NULL,
            bot_token TEXT NOT NULL UNIQUE,
            bot_username TEXT,
            registered_by INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            registered_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_updated TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Columns added after the initial schema shipped
    let mut existing: Vec<String> = Vec::new();
    let mut stmt = conn.prepare("PRAGMA table_info(bots)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in rows {
        existing.push(name?);
    }

    for (column, ddl) in [
        ("registered_by", "ALTER TABLE bots ADD COLUMN registered_by INTEGER NOT NULL DEFAULT 0"),
        ("last_updated", "ALTER TABLE bots ADD COLUMN last_updated TEXT NOT NULL DEFAULT ''"),
    ] {
        if !existing.iter().any(|c| c == column) {
            log::info!("Migrating schema: adding bots.{}", column);
            conn.execute(ddl, [])?;
        }
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_bots_active ON bots(is_active)",
        [],
    )?;

    Ok(())
}

/// Read access the registry needs, plus the write-back and the two
/// mutations the registration gateway performs. Kept as a trait so the
/// registry and bootstrap can run against an in-memory double in tests.
#[async_trait]
pub trait BotRecordStore: Send + Sync {
    /// Fetch all records with `active = true`, in storage order.
    async fn fetch_active(&self) -> BotResult<Vec<BotRecord>>;

    /// Look up a single active record by identity.
    ///
    /// Matches the username *or* the storage id, so registry keys stay
    /// resolvable after a username backfill.
    async fn find_active(&self, identity: &str) -> BotResult<Option<BotRecord>>;

    /// Write a discovered username back onto a record. Best-effort from
    /// the caller's point of view; failures are logged, not raised.
    async fn backfill_username(&self, storage_id: &str, username: &str) -> BotResult<()>;

    /// Insert a freshly registered record.
    async fn insert(&self, record: &BotRecord) -> BotResult<()>;

    /// Flip a record to inactive.
    async fn deactivate(&self, identity: &str) -> BotResult<()>;
}

/// SQLite implementation of [`BotRecordStore`].
pub struct SqliteBotStore {
    pool: Arc<DbPool>,
}

impl SqliteBotStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &Row<'_>) -> rusqlite::Result<BotRecord> {
        Ok(BotRecord {
            storage_id: row.get(0)?,
            agent_id: row.get(1)?,
            email: row.get(2)?,
            bot_name: row.get(3)?,
            token: row.get(4)?,
            username: row.get::<_, Option<String>>(5)?.filter(|u| !u.is_empty()),
            registered_by: row.get(6)?,
            active: row.get::<_, i64>(7)? != 0,
            registered_at: row.get(8)?,
        })
    }
}

const RECORD_COLUMNS: &str =
    "id, agent_id, email, bot_name, bot_token, bot_username, registered_by, is_active, registered_at";

#[async_trait]
impl BotRecordStore for SqliteBotStore {
    async fn fetch_active(&self) -> BotResult<Vec<BotRecord>> {
        let conn = get_connection(&self.pool)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bots WHERE is_active = 1 ORDER BY registered_at, id",
            RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::record_from_row)?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    async fn find_active(&self, identity: &str) -> BotResult<Option<BotRecord>> {
        let conn = get_connection(&self.pool)?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM bots WHERE is_active = 1 AND (bot_username = ?1 OR id = ?1)",
                    RECORD_COLUMNS
                ),
                params![identity],
                Self::record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    async fn backfill_username(&self, storage_id: &str, username: &str) -> BotResult<()> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE bots SET bot_username = ?1, last_updated = datetime('now') WHERE id = ?2",
            params![username, storage_id],
        )?;
        Ok(())
    }

    async fn insert(&self, record: &BotRecord) -> BotResult<()> {
        if record.token.trim().is_empty() {
            return Err(BotError::Store("refusing to insert record with empty token".to_string()));
        }

        let conn = get_connection(&self.pool)?;
        conn.execute(
            "INSERT INTO bots (id, agent_id, email, bot_name, bot_token, bot_username, registered_by, is_active, registered_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))",
            params![
                record.storage_id,
                record.agent_id,
                record.email,
                record.bot_name,
                record.token,
                record.username,
                record.registered_by,
                record.active as i64,
                record.registered_at,
            ],
        )?;
        Ok(())
    }

    async fn deactivate(&self, identity: &str) -> BotResult<()> {
        let conn = get_connection(&self.pool)?;
        conn.execute(
            "UPDATE bots SET is_active = 0, last_updated = datetime('now') WHERE bot_username = ?1 OR id = ?1",
            params![identity],
        )?;
        Ok(())
    }
}
