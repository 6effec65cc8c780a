//! Integration tests for the bot instance registry
//!
//! Run with: cargo test --test registry_test

mod common;

use std::sync::Arc;

use botfleet::manager::registry::{BotRegistry, RestartOutcome, StartOutcome};
use botfleet::storage::db::BotRecordStore;
use pretty_assertions::assert_eq;

use common::{malformed_record, noop_attach, record, MemoryStore, MockClientFactory};

fn registry_with(
    factory: Arc<MockClientFactory>,
    store: Arc<MemoryStore>,
) -> Arc<BotRegistry> {
    BotRegistry::new(factory, store, noop_attach())
}

#[tokio::test]
async fn test_start_is_idempotent_for_live_identity() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::new();
    let registry = registry_with(Arc::clone(&factory), store);

    let rec = record("a", Some("alpha_bot"));
    assert_eq!(registry.start(&rec).await.unwrap(), StartOutcome::Started);
    assert_eq!(registry.start(&rec).await.unwrap(), StartOutcome::AlreadyRunning);

    // Exactly one underlying adapter start, exactly one entry.
    assert_eq!(factory.ledger.start_count(), 1);
    assert_eq!(registry.stats().active_count, 1);
    assert!(registry.is_active("alpha_bot"));
}

#[tokio::test]
async fn test_stop_then_absent() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::new();
    let registry = registry_with(factory, store);

    registry.start(&record("a", Some("alpha_bot"))).await.unwrap();
    assert!(registry.stop("alpha_bot").await);

    assert!(!registry.is_active("alpha_bot"));
    assert!(registry.client("alpha_bot").is_none());
    assert!(registry.scheduler("alpha_bot").is_none());

    // Second stop is a no-op, not an error.
    assert!(!registry.stop("alpha_bot").await);
}

#[tokio::test]
async fn test_malformed_token_never_reaches_the_factory() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::new();
    let registry = registry_with(Arc::clone(&factory), store);

    let err = registry.start(&malformed_record("a", Some("alpha_bot"))).await.unwrap_err();
    assert_eq!(err.kind(), "format");

    assert!(factory.ledger.built_tokens().is_empty());
    assert!(!registry.is_active("alpha_bot"));
    assert_eq!(registry.stats().active_count, 0);
}

#[tokio::test]
async fn test_failed_start_leaves_no_partial_state() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::new();
    let registry = registry_with(Arc::clone(&factory), store);

    let rec = record("a", Some("alpha_bot"));
    factory.fail_start(&rec.token);

    let err = registry.start(&rec).await.unwrap_err();
    assert_eq!(err.kind(), "auth");
    assert!(!registry.is_active("alpha_bot"));
    assert_eq!(registry.stats().active_count, 0);

    // The identity is startable again once the factory cooperates.
    let factory2 = MockClientFactory::new();
    let registry2 = registry_with(factory2, MemoryStore::new());
    assert_eq!(registry2.start(&rec).await.unwrap(), StartOutcome::Started);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_start_times_out_without_partial_state() {
    let factory = MockClientFactory::new();
    let registry = registry_with(Arc::clone(&factory), MemoryStore::new());

    let rec = record("a", Some("alpha_bot"));
    factory.hang_start(&rec.token);

    let err = registry.start(&rec).await.unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert!(!registry.is_active("alpha_bot"));
    assert_eq!(registry.stats().active_count, 0);

    // The half-started client was told to clean up, exactly once.
    assert_eq!(factory.ledger.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_start_with_stuck_cleanup_still_reports_timeout() {
    let factory = MockClientFactory::new();
    let registry = registry_with(Arc::clone(&factory), MemoryStore::new());

    let rec = record("a", Some("alpha_bot"));
    factory.hang_start(&rec.token);
    factory.hang_stop(&rec.token);

    // Even when the cleanup stop itself never resolves, the caller gets
    // the timeout within the bounded waits and no entry is left behind.
    let err = registry.start(&rec).await.unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert!(!registry.is_active("alpha_bot"));
    assert_eq!(factory.ledger.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_stop_still_removes_the_entry() {
    let factory = MockClientFactory::new();
    let registry = registry_with(Arc::clone(&factory), MemoryStore::new());

    let rec = record("a", Some("alpha_bot"));
    factory.hang_stop(&rec.token);
    registry.start(&rec).await.unwrap();

    // Forced removal: a stuck adapter never leaves an ambiguous entry.
    assert!(registry.stop("alpha_bot").await);
    assert!(!registry.is_active("alpha_bot"));
    assert_eq!(registry.stats().active_count, 0);
}

#[tokio::test]
async fn test_restart_uses_fresh_record_from_store() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::with_records(vec![record("a", Some("alpha_bot"))]);
    let registry = registry_with(Arc::clone(&factory), Arc::clone(&store));

    let original = store.find_active("alpha_bot").await.unwrap().unwrap();
    registry.start(&original).await.unwrap();
    let first_client = registry.client("alpha_bot").unwrap();

    // The gateway rotates the token between our start and the restart.
    store.set_token("alpha_bot", "2000000000:rotated-secret-0123456789");

    assert_eq!(registry.restart("alpha_bot").await.unwrap(), RestartOutcome::Restarted);

    let built = factory.ledger.built_tokens();
    assert_eq!(built.len(), 2);
    assert_eq!(built[0], original.token);
    assert_eq!(built[1], "2000000000:rotated-secret-0123456789");

    // A different client instance is live now.
    let second_client = registry.client("alpha_bot").unwrap();
    assert!(!Arc::ptr_eq(&first_client, &second_client));
}

#[tokio::test]
async fn test_restart_of_inactive_record_degrades_to_stop() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::with_records(vec![record("a", Some("alpha_bot"))]);
    let registry = registry_with(factory, Arc::clone(&store));

    let rec = store.find_active("alpha_bot").await.unwrap().unwrap();
    registry.start(&rec).await.unwrap();

    store.deactivate("alpha_bot").await.unwrap();

    assert_eq!(registry.restart("alpha_bot").await.unwrap(), RestartOutcome::Stopped);
    assert!(!registry.is_active("alpha_bot"));
}

#[tokio::test]
async fn test_restart_propagates_store_failure_after_stopping() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::with_records(vec![record("a", Some("alpha_bot"))]);
    let registry = registry_with(factory, Arc::clone(&store));

    let rec = store.find_active("alpha_bot").await.unwrap().unwrap();
    registry.start(&rec).await.unwrap();

    store.set_fail_fetch(true);

    let err = registry.restart("alpha_bot").await.unwrap_err();
    assert_eq!(err.kind(), "store");
    // The stop half of the cycle already happened.
    assert!(!registry.is_active("alpha_bot"));
}

#[tokio::test]
async fn test_username_backfill_for_placeholder_identity() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::with_records(vec![record("rec-9", None)]);
    let registry = registry_with(Arc::clone(&factory), Arc::clone(&store));

    let rec = store.find_active("rec-9").await.unwrap().unwrap();
    factory.set_username(&rec.token, "discovered_bot");

    registry.start(&rec).await.unwrap();

    // Registry key stays the storage id for this run; the store learned
    // the real username for the next restart.
    assert!(registry.is_active("rec-9"));
    assert_eq!(store.record_username("rec-9").as_deref(), Some("discovered_bot"));

    // And a restart rolls the key over to the username.
    assert_eq!(registry.restart("rec-9").await.unwrap(), RestartOutcome::Restarted);
    assert!(registry.is_active("discovered_bot"));
    assert!(!registry.is_active("rec-9"));
}

#[tokio::test]
async fn test_stats_reports_identities_in_start_order() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::new();
    let registry = registry_with(factory, store);

    registry.start(&record("a", Some("alpha_bot"))).await.unwrap();
    registry.start(&record("b", Some("beta_bot"))).await.unwrap();
    registry.start(&record("c", Some("gamma_bot"))).await.unwrap();

    let stats = registry.stats();
    assert_eq!(stats.active_count, 3);
    assert_eq!(stats.scheduler_count, 3);
    assert_eq!(stats.identities, vec!["alpha_bot", "beta_bot", "gamma_bot"]);
}

#[tokio::test]
async fn test_shutdown_all_empties_registry_despite_stop_failures() {
    let factory = MockClientFactory::new();
    let store = MemoryStore::new();
    let registry = registry_with(Arc::clone(&factory), store);

    let bad = record("b", Some("beta_bot"));
    factory.fail_stop(&bad.token);

    registry.start(&record("a", Some("alpha_bot"))).await.unwrap();
    registry.start(&bad).await.unwrap();
    registry.start(&record("c", Some("gamma_bot"))).await.unwrap();

    registry.shutdown_all().await;

    assert_eq!(registry.stats().active_count, 0);
    assert!(registry.stats().identities.is_empty());
    // Every client was told to stop, including the failing one.
    assert_eq!(factory.ledger.stop_count(), 3);
}

#[tokio::test]
async fn test_lookups_return_absent_for_unknown_identity() {
    let registry = registry_with(MockClientFactory::new(), MemoryStore::new());

    assert!(!registry.is_active("ghost"));
    assert!(registry.client("ghost").is_none());
    assert!(registry.scheduler("ghost").is_none());
}
