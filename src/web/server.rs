//! Admin/webhook HTTP surface.
//!
//! Receives registration notifications from the gateway bot at
//! /webhook/bot-registration and exposes read-only stats plus manual
//! stop/restart triggers. Runs on WEBHOOK_PORT (default 3001).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::manager::events::{EventHandler, RegistrationEvent};
use crate::manager::registry::{BotRegistry, RestartOutcome};
use crate::storage::db::BotRecordStore;

/// Shared state for the admin surface.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<BotRegistry>,
    pub store: Arc<dyn BotRecordStore>,
    pub events: Arc<EventHandler>,
}

/// Build the admin router. Split from [`run_server`] so tests can drive
/// it without binding a socket.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/bot-registration", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/api/bots", get(list_bots_handler))
        .route("/api/bots/{identity}/restart", post(restart_handler))
        .route("/api/bots/{identity}/stop", post(stop_handler))
        .with_state(state)
}

/// Start the admin/webhook server.
pub async fn run_server(port: u16, state: AppState) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = build_router(state);

    log::info!("Starting admin server on http://{}", addr);
    log::info!("  POST /webhook/bot-registration  - registration events");
    log::info!("  GET  /health                    - health + registry stats");
    log::info!("  GET  /api/bots                  - active records and instances");
    log::info!("  POST /api/bots/{{id}}/restart     - manual restart");
    log::info!("  POST /api/bots/{{id}}/stop        - manual stop");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// POST /webhook/bot-registration — forward a registration event.
///
/// Recognized events always ack success, even when the registry call
/// behind them failed: event failures are operator-visible via logs and
/// stats, not via transport error codes. An unrecognized action is
/// logged and acked; only an unparseable body is the caller's fault.
async fn webhook_handler(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Response {
    let action = body.get("action").and_then(|a| a.as_str()).unwrap_or("?").to_string();
    log::info!("📨 Webhook received: {}", action);

    match serde_json::from_value::<RegistrationEvent>(body) {
        Ok(event) => {
            let message = state.events.handle(event).await;
            Json(json!({ "success": true, "message": message })).into_response()
        }
        Err(e) => {
            log::warn!("⚠️ Unknown or malformed webhook action '{}': {}", action, e);
            Json(json!({ "success": true, "message": format!("Ignored action '{}'", action) })).into_response()
        }
    }
}

/// GET /health — liveness plus registry stats.
async fn health_handler(State(state): State<AppState>) -> Response {
    let stats = state.registry.stats();
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "stats": stats,
    }))
    .into_response()
}

/// GET /api/bots — active records from the store plus live instances.
async fn list_bots_handler(State(state): State<AppState>) -> Response {
    match state.store.fetch_active().await {
        Ok(records) => {
            // Tokens stay out of API responses.
            let data: Vec<serde_json::Value> = records
                .iter()
                .map(|r| {
                    json!({
                        "id": r.storage_id,
                        "agentId": r.agent_id,
                        "email": r.email,
                        "botName": r.bot_name,
                        "botUsername": r.username,
                        "identity": r.identity(),
                        "isActive": r.active,
                        "registeredAt": r.registered_at,
                    })
                })
                .collect();

            Json(json!({
                "success": true,
                "data": data,
                "activeInstances": state.registry.stats().identities,
            }))
            .into_response()
        }
        Err(e) => {
            log::error!("Failed to list bot records: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": format!("[{}] {}", e.kind(), e) })),
            )
                .into_response()
        }
    }
}

/// POST /api/bots/{identity}/restart — manual restart trigger.
///
/// Unlike the webhook path this reports failure: an operator pressing
/// the button needs to know it didn't work, and why.
async fn restart_handler(State(state): State<AppState>, Path(identity): Path<String>) -> Response {
    match state.registry.restart(&identity).await {
        Ok(RestartOutcome::Restarted) => Json(json!({
            "success": true,
            "message": format!("Bot '{}' restarted", identity),
        }))
        .into_response(),
        Ok(RestartOutcome::Stopped) => Json(json!({
            "success": true,
            "message": format!("Bot '{}' is no longer active; stopped", identity),
        }))
        .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": format!("[{}] {}", e.kind(), e) })),
        )
            .into_response(),
    }
}

/// POST /api/bots/{identity}/stop — manual stop trigger.
async fn stop_handler(State(state): State<AppState>, Path(identity): Path<String>) -> Response {
    let stopped = state.registry.stop(&identity).await;
    Json(json!({
        "success": true,
        "stopped": stopped,
        "message": if stopped {
            format!("Bot '{}' stopped", identity)
        } else {
            format!("Bot '{}' was not running", identity)
        },
    }))
    .into_response()
}
