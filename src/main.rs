use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::signal;

use botfleet::cli::{Cli, Commands};
use botfleet::core::{config, init_logger, log_startup_configuration};
use botfleet::manager::{initialize_bots, BotRegistry, EventHandler};
use botfleet::storage::{create_pool, BotRecordStore, SqliteBotStore};
use botfleet::telegram::{default_controller, validate_token_format, TelegramClientFactory};
use botfleet::web::{run_server, AppState};

/// Main entry point for the bot host
///
/// Parses CLI arguments and dispatches to the appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, server bind).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Catch panics escaping spawned per-bot tasks so one bot's handler
    // bug doesn't take down the whole fleet silently.
    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
    }));

    init_logger(&config::LOG_FILE_PATH)?;

    // Load environment variables from .env if present
    let _ = dotenv();

    match cli.command {
        Some(Commands::Run { port }) => run_host(port).await,
        Some(Commands::CheckToken { token }) => run_check_token(&token),
        Some(Commands::List) => run_list().await,
        None => {
            log::info!("No command specified, running host in default mode");
            run_host(None).await
        }
    }
}

/// Run the host: bootstrap persisted bots, serve the admin/webhook API,
/// shut everything down on ctrl-c.
async fn run_host(port: Option<u16>) -> Result<()> {
    log_startup_configuration();

    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    let store: Arc<dyn BotRecordStore> = Arc::new(SqliteBotStore::new(db_pool));

    let factory = Arc::new(TelegramClientFactory::new());
    let registry = BotRegistry::new(factory, Arc::clone(&store), default_controller());
    let events = Arc::new(EventHandler::new(Arc::clone(&registry)));

    let report = initialize_bots(&registry, &store).await;
    log::info!(
        "📡 Host ready: {} bot(s) live, accepting registrations",
        report.succeeded
    );

    let webhook_port = port.unwrap_or(*config::WEBHOOK_PORT);
    let state = AppState {
        registry: Arc::clone(&registry),
        store,
        events,
    };
    let server = tokio::spawn(run_server(webhook_port, state));

    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Shutting down gracefully...");
        }
        result = server => {
            match result {
                Ok(Err(e)) => log::error!("Admin server exited with error: {}", e),
                Err(e) => log::error!("Admin server task failed: {}", e),
                Ok(Ok(())) => log::warn!("Admin server exited"),
            }
        }
    }

    registry.shutdown_all().await;

    let stats = registry.stats();
    log::info!("Final registry state: {} live bot(s)", stats.active_count);

    Ok(())
}

/// Offline token shape check; exits non-zero on a malformed token.
fn run_check_token(token: &str) -> Result<()> {
    match validate_token_format(token) {
        Ok(()) => {
            println!("token shape OK");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("{}", e)),
    }
}

/// Print the active bot records from the store.
async fn run_list() -> Result<()> {
    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    let store = SqliteBotStore::new(db_pool);

    let records = store
        .fetch_active()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to fetch records: {}", e))?;

    if records.is_empty() {
        println!("no active bot records");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  name={}  agent={}  username={}",
            record.storage_id,
            record.bot_name,
            record.agent_id,
            record.username.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
