// ABOUTME: HTTP and WebSocket routes exposing the engine supervisor
// ABOUTME: list_engines, set_engine, health, and the /ws relay session

use crate::session::{self, NO_ENGINE};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use gambit_core::EngineSupervisor;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<EngineSupervisor>,
    /// Queue depth for each client's broadcast sink
    pub client_queue: usize,
}

/// Body of `GET /list_engines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineList {
    pub engines: Vec<String>,
    pub active: String,
}

/// Body of `GET /set_engine/{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SetEngineResponse {
    Ok { active: String },
    Error { message: String },
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/list_engines", get(list_engines))
        .route("/set_engine/{name}", get(set_engine))
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Serve on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn list_engines(State(state): State<AppState>) -> Json<EngineList> {
    let listing = state.supervisor.list_engines();
    Json(EngineList {
        engines: listing.engines,
        active: listing.active.unwrap_or_else(|| NO_ENGINE.to_string()),
    })
}

async fn set_engine(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<SetEngineResponse> {
    // Run the swap on its own task so a client hanging up mid-request cannot
    // abandon it halfway.
    let supervisor = Arc::clone(&state.supervisor);
    let swap = tokio::spawn(async move { supervisor.load_engine(&name).await });

    let response = match swap.await {
        Ok(Ok(active)) => {
            info!(engine = %active, "Engine switched by client request");
            SetEngineResponse::Ok { active }
        }
        Ok(Err(e)) => SetEngineResponse::Error {
            message: e.to_string(),
        },
        Err(e) => {
            error!(error = %e, "Engine swap task failed");
            SetEngineResponse::Error {
                message: "engine swap failed unexpectedly".to_string(),
            }
        }
    };
    Json(response)
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "online".to_string(),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::run_session(socket, state.supervisor, state.client_queue))
}
