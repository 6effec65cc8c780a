//! Common test doubles for the manager test suites
//!
//! `MockClientFactory` builds scriptable in-memory clients and keeps a
//! ledger of every build/start/stop, so tests can assert exactly how the
//! registry drove the adapter. `MemoryStore` is a mutable in-memory
//! record store.

use async_trait::async_trait;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use botfleet::core::error::{BotError, BotResult};
use botfleet::storage::db::{BotRecord, BotRecordStore};
use botfleet::telegram::adapter::{BotClient, ClientFactory, SelfInfo};
use botfleet::telegram::controller::ControllerAttach;

/// One recorded `start()` invocation.
#[derive(Debug, Clone)]
pub struct StartCall {
    pub token: String,
    pub at: tokio::time::Instant,
}

/// Everything the mock clients did, in order.
#[derive(Default)]
pub struct Ledger {
    pub built: Mutex<Vec<String>>,
    pub starts: Mutex<Vec<StartCall>>,
    pub stops: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<(i64, String)>>,
}

impl Ledger {
    pub fn built_tokens(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }

    pub fn start_calls(&self) -> Vec<StartCall> {
        self.starts.lock().unwrap().clone()
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.lock().unwrap().len()
    }
}

pub struct MockBotClient {
    token: String,
    username: Option<String>,
    fail_start: bool,
    fail_stop: bool,
    hang_start: bool,
    hang_stop: bool,
    ledger: Arc<Ledger>,
}

#[async_trait]
impl BotClient for MockBotClient {
    async fn start(&self) -> BotResult<()> {
        self.ledger.starts.lock().unwrap().push(StartCall {
            token: self.token.clone(),
            at: tokio::time::Instant::now(),
        });
        if self.hang_start {
            std::future::pending::<()>().await;
        }
        if self.fail_start {
            return Err(BotError::AuthRejected("mock credential rejected".to_string()));
        }
        Ok(())
    }

    async fn stop(&self) -> BotResult<()> {
        self.ledger.stops.lock().unwrap().push(self.token.clone());
        if self.hang_stop {
            std::future::pending::<()>().await;
        }
        if self.fail_stop {
            return Err(BotError::Network("mock teardown failure".to_string()));
        }
        Ok(())
    }

    async fn self_info(&self) -> BotResult<SelfInfo> {
        Ok(SelfInfo {
            id: 1,
            username: self.username.clone(),
        })
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> BotResult<()> {
        self.ledger.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scriptable [`ClientFactory`] double.
pub struct MockClientFactory {
    pub ledger: Arc<Ledger>,
    fail_start_tokens: Mutex<HashSet<String>>,
    fail_stop_tokens: Mutex<HashSet<String>>,
    hang_start_tokens: Mutex<HashSet<String>>,
    hang_stop_tokens: Mutex<HashSet<String>>,
    usernames: Mutex<HashMap<String, String>>,
}

impl MockClientFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ledger: Arc::new(Ledger::default()),
            fail_start_tokens: Mutex::new(HashSet::new()),
            fail_stop_tokens: Mutex::new(HashSet::new()),
            hang_start_tokens: Mutex::new(HashSet::new()),
            hang_stop_tokens: Mutex::new(HashSet::new()),
            usernames: Mutex::new(HashMap::new()),
        })
    }

    /// Make `start()` fail for clients built from this token.
    pub fn fail_start(&self, token: &str) {
        self.fail_start_tokens.lock().unwrap().insert(token.to_string());
    }

    /// Make `stop()` fail for clients built from this token.
    pub fn fail_stop(&self, token: &str) {
        self.fail_stop_tokens.lock().unwrap().insert(token.to_string());
    }

    /// Make `start()` never resolve for clients built from this token.
    pub fn hang_start(&self, token: &str) {
        self.hang_start_tokens.lock().unwrap().insert(token.to_string());
    }

    /// Make `stop()` never resolve for clients built from this token.
    pub fn hang_stop(&self, token: &str) {
        self.hang_stop_tokens.lock().unwrap().insert(token.to_string());
    }

    /// Username reported by `self_info()` for clients built from this token.
    pub fn set_username(&self, token: &str, username: &str) {
        self.usernames.lock().unwrap().insert(token.to_string(), username.to_string());
    }
}

impl ClientFactory for MockClientFactory {
    fn build(&self, token: &str) -> BotResult<Arc<dyn BotClient>> {
        self.ledger.built.lock().unwrap().push(token.to_string());
        Ok(Arc::new(MockBotClient {
            token: token.to_string(),
            username: self.usernames.lock().unwrap().get(token).cloned(),
            fail_start: self.fail_start_tokens.lock().unwrap().contains(token),
            fail_stop: self.fail_stop_tokens.lock().unwrap().contains(token),
            hang_start: self.hang_start_tokens.lock().unwrap().contains(token),
            hang_stop: self.hang_stop_tokens.lock().unwrap().contains(token),
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

/// In-memory [`BotRecordStore`] with scriptable fetch failure.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<BotRecord>>,
    fail_fetch: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_records(records: Vec<BotRecord>) -> Arc<Self> {
        let store = Self::new();
        *store.records.lock().unwrap() = records;
        store
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        *self.fail_fetch.lock().unwrap() = fail;
    }

    /// Replace a record's token in place (simulates the gateway updating
    /// a record between two restarts).
    pub fn set_token(&self, identity: &str, token: &str) {
        for record in self.records.lock().unwrap().iter_mut() {
            if record.identity() == identity {
                record.token = token.to_string();
            }
        }
    }

    pub fn record_username(&self, storage_id: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.storage_id == storage_id)
            .and_then(|r| r.username.clone())
    }
}

#[async_trait]
impl BotRecordStore for MemoryStore {
    async fn fetch_active(&self) -> BotResult<Vec<BotRecord>> {
        if *self.fail_fetch.lock().unwrap() {
            return Err(BotError::Store("mock store unavailable".to_string()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn find_active(&self, identity: &str) -> BotResult<Option<BotRecord>> {
        if *self.fail_fetch.lock().unwrap() {
            return Err(BotError::Store("mock store unavailable".to_string()));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.active && (r.identity() == identity || r.storage_id == identity))
            .cloned())
    }

    async fn backfill_username(&self, storage_id: &str, username: &str) -> BotResult<()> {
        for record in self.records.lock().unwrap().iter_mut() {
            if record.storage_id == storage_id {
                record.username = Some(username.to_string());
            }
        }
        Ok(())
    }

    async fn insert(&self, record: &BotRecord) -> BotResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn deactivate(&self, identity: &str) -> BotResult<()> {
        for record in self.records.lock().unwrap().iter_mut() {
            if record.identity() == identity || record.storage_id == identity {
                record.active = false;
            }
        }
        Ok(())
    }
}

/// Attachment that wires nothing; most tests only exercise lifecycle.
pub fn noop_attach() -> ControllerAttach {
    Arc::new(|_, _, _| Ok(()))
}

/// A well-formed record. Token shape passes the pre-flight check.
pub fn record(storage_id: &str, username: Option<&str>) -> BotRecord {
    BotRecord {
        storage_id: storage_id.to_string(),
        agent_id: format!("AG-{}", storage_id),
        email: "owner@example.com".to_string(),
        bot_name: format!("Bot {}", storage_id),
        token: format!("1000000000:mock-secret-{}-0123456789abcdef", storage_id),
        username: username.map(str::to_string),
        registered_by: 7,
        active: true,
        registered_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// A record whose token fails the shape check.
pub fn malformed_record(storage_id: &str, username: Option<&str>) -> BotRecord {
    let mut rec = record(storage_id, username);
    rec.token = "not-a-token".to_string();
    rec
}
