//! Bot instance registry: the single source of truth for which bots are
//! currently live, and the only component allowed to start or stop one.
//!
//! Invariants:
//! - an entry exists iff its client is started and accepting events
//!   (there is no "stopped but present" state)
//! - at most one entry per identity; starting a live identity is a
//!   reported no-op, not an error
//!
//! All mutations (start/stop/restart) are serialized through one async
//! ops lock, because `start` is a check-then-insert sequence with await
//! points in the middle. Reads go through the map without the lock.

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::core::config;
use crate::core::error::{BotError, BotResult};
use crate::manager::scheduler::SchedulerHandle;
use crate::storage::db::{BotRecord, BotRecordStore};
use crate::telegram::adapter::{validate_token_format, BotClient, ClientFactory};
use crate::telegram::controller::ControllerAttach;

/// What `start` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new client was built and started.
    Started,
    /// The identity was already live; nothing happened.
    AlreadyRunning,
}

/// What `restart` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Stopped and started fresh from the current store record.
    Restarted,
    /// The record is gone or inactive; the restart degraded to a stop.
    Stopped,
}

/// Read-only registry snapshot for the admin surface.
///
/// `scheduler_count` always equals `active_count`; it is reported
/// separately only because operators are used to seeing both.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub active_count: usize,
    pub identities: Vec<String>,
    pub scheduler_count: usize,
}

/// One live bot: client plus its scheduler, torn down as a unit.
struct ManagedBot {
    identity: String,
    client: Arc<dyn BotClient>,
    scheduler: SchedulerHandle,
    started_at: Instant,
}

impl ManagedBot {
    /// Stop the client and cancel the scheduler. The entry has already
    /// been removed from the map by the time this runs; stop failures
    /// are logged, never surfaced, and never resurrect the entry.
    async fn teardown(self, stop_timeout: Duration) -> bool {
        self.scheduler.shutdown();

        match timeout(stop_timeout, self.client.stop()).await {
            Ok(Ok(())) => {
                log::info!("🛑 Bot '{}' stopped", self.identity);
                true
            }
            Ok(Err(e)) => {
                log::warn!(
                    "Bot '{}' stop reported [{}] {}; entry removed anyway",
                    self.identity,
                    e.kind(),
                    e
                );
                false
            }
            Err(_) => {
                log::warn!(
                    "Bot '{}' stop timed out after {:?}; entry removed anyway",
                    self.identity,
                    stop_timeout
                );
                false
            }
        }
    }
}

/// Process-wide registry of dynamically managed bot instances.
///
/// Constructed once at startup and shared by the bootstrap initializer,
/// the event handler, and the admin surface. Controller attachments get
/// a `Weak` handle so a client holding its controller closures never
/// keeps the registry alive.
pub struct BotRegistry {
    entries: DashMap<String, ManagedBot>,
    ops: Mutex<()>,
    factory: Arc<dyn ClientFactory>,
    store: Arc<dyn BotRecordStore>,
    attach: ControllerAttach,
    self_ref: Weak<BotRegistry>,
}

impl BotRegistry {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        store: Arc<dyn BotRecordStore>,
        attach: ControllerAttach,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            entries: DashMap::new(),
            ops: Mutex::new(()),
            factory,
            store,
            attach,
            self_ref: weak.clone(),
        })
    }

    /// Start a bot from a record.
    ///
    /// No-op (reported, not an error) when the identity is already live.
    /// On any failure no entry is left behind and the categorized reason
    /// is logged with the offending identity.
    pub async fn start(&self, record: &BotRecord) -> BotResult<StartOutcome> {
        let _guard = self.ops.lock().await;
        let result = self.start_locked(record).await;
        if let Err(ref e) = result {
            log::error!("❌ Failed to start bot '{}' [{}]: {}", record.identity(), e.kind(), e);
        }
        result
    }

    async fn start_locked(&self, record: &BotRecord) -> BotResult<StartOutcome> {
        let identity = record.identity().to_string();

        if self.entries.contains_key(&identity) {
            log::info!("⚠️ Bot '{}' is already running", identity);
            return Ok(StartOutcome::AlreadyRunning);
        }

        validate_token_format(&record.token)?;

        let client = self.factory.build(&record.token)?;
        let scheduler = SchedulerHandle::new(&identity);

        // Handlers must be wired before traffic can arrive.
        (self.attach)(&client, &scheduler, self.self_ref.clone())?;

        let start_timeout = config::manager::start_timeout();
        match timeout(start_timeout, client.start()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                scheduler.shutdown();
                return Err(e);
            }
            Err(_) => {
                // The caller stops waiting; tell the half-started client to
                // clean up so we don't leak a polling session.
                scheduler.shutdown();
                match timeout(config::manager::stop_timeout(), client.stop()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::warn!("Cleanup stop for '{}' failed: {}", identity, e),
                    Err(_) => log::warn!(
                        "Cleanup stop for '{}' timed out after {:?}",
                        identity,
                        config::manager::stop_timeout()
                    ),
                }
                return Err(BotError::Timeout(start_timeout));
            }
        }

        self.backfill_username(record, &client).await;

        scheduler.start_ticker(Arc::clone(&client));

        log::info!("✅ Bot '{}' ({}) started — agent {}", identity, record.bot_name, record.agent_id);

        self.entries.insert(
            identity.clone(),
            ManagedBot {
                identity,
                client,
                scheduler,
                started_at: Instant::now(),
            },
        );

        Ok(StartOutcome::Started)
    }

    /// If the record was registered before its username was known, ask the
    /// live client who it is and write the answer back. Best-effort: a
    /// failed write-back is logged and swallowed.
    async fn backfill_username(&self, record: &BotRecord, client: &Arc<dyn BotClient>) {
        if record.username.as_deref().is_some_and(|u| !u.is_empty()) {
            return;
        }

        let info = match client.self_info().await {
            Ok(info) => info,
            Err(e) => {
                log::warn!("Could not query self info for '{}': {}", record.identity(), e);
                return;
            }
        };

        if let Some(username) = info.username {
            log::info!("Discovered username @{} for record {}", username, record.storage_id);
            if let Err(e) = self.store.backfill_username(&record.storage_id, &username).await {
                log::warn!("Username write-back for {} failed: {}", record.storage_id, e);
            }
        }
    }

    /// Stop a bot and remove its entry. Returns whether anything was
    /// stopped; absent identities are a no-op, not an error.
    pub async fn stop(&self, identity: &str) -> bool {
        let _guard = self.ops.lock().await;
        self.stop_locked(identity).await
    }

    async fn stop_locked(&self, identity: &str) -> bool {
        let Some((_, entry)) = self.entries.remove(identity) else {
            log::debug!("Stop requested for '{}', which is not running", identity);
            return false;
        };
        entry.teardown(config::manager::stop_timeout()).await;
        true
    }

    /// Stop, re-fetch the current record, and start fresh.
    ///
    /// The deliberate re-fetch picks up token or metadata changes made
    /// since the entry was created. A record that is gone or inactive
    /// degrades the restart to a pure stop.
    pub async fn restart(&self, identity: &str) -> BotResult<RestartOutcome> {
        let _guard = self.ops.lock().await;

        self.stop_locked(identity).await;

        let record = match self.store.find_active(identity).await {
            Ok(record) => record,
            Err(e) => {
                log::error!("❌ Restart of '{}' could not re-fetch record [{}]: {}", identity, e.kind(), e);
                return Err(e);
            }
        };

        match record {
            Some(record) => {
                let result = self.start_locked(&record).await;
                match result {
                    Ok(_) => Ok(RestartOutcome::Restarted),
                    Err(e) => {
                        log::error!("❌ Failed to restart bot '{}' [{}]: {}", identity, e.kind(), e);
                        Err(e)
                    }
                }
            }
            None => {
                log::info!("Record for '{}' is gone or inactive; restart degraded to stop", identity);
                Ok(RestartOutcome::Stopped)
            }
        }
    }

    /// Pure membership query.
    pub fn is_active(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Look up a live bot's client.
    pub fn client(&self, identity: &str) -> Option<Arc<dyn BotClient>> {
        self.entries.get(identity).map(|e| Arc::clone(&e.client))
    }

    /// Look up a live bot's scheduler handle.
    pub fn scheduler(&self, identity: &str) -> Option<SchedulerHandle> {
        self.entries.get(identity).map(|e| e.scheduler.clone())
    }

    /// Snapshot of the live entries, identities in start order.
    pub fn stats(&self) -> RegistryStats {
        let mut live: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|e| (e.started_at, e.identity.clone()))
            .collect();
        live.sort_by_key(|(started_at, _)| *started_at);

        let identities: Vec<String> = live.into_iter().map(|(_, id)| id).collect();
        RegistryStats {
            active_count: identities.len(),
            scheduler_count: identities.len(),
            identities,
        }
    }

    /// Stop every live bot, concurrently, and wait for all of them.
    ///
    /// Collect-and-continue: one failing stop never prevents the others
    /// from being attempted, and the registry is empty afterwards no
    /// matter how many individual stops failed.
    pub async fn shutdown_all(&self) {
        let drained: Vec<ManagedBot> = {
            let _guard = self.ops.lock().await;
            let identities: Vec<String> = self.entries.iter().map(|e| e.identity.clone()).collect();
            identities
                .iter()
                .filter_map(|id| self.entries.remove(id).map(|(_, entry)| entry))
                .collect()
        };

        if drained.is_empty() {
            log::info!("Shutdown: no live bots");
            return;
        }

        log::info!("🛑 Shutting down {} bot(s)...", drained.len());

        let stop_timeout = config::manager::stop_timeout();
        let results = join_all(drained.into_iter().map(|entry| entry.teardown(stop_timeout))).await;

        let clean = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - clean;
        if failed == 0 {
            log::info!("✅ All {} bot(s) shut down cleanly", clean);
        } else {
            log::warn!("Shutdown finished: {} clean, {} with errors (entries removed regardless)", clean, failed);
        }
    }
}
