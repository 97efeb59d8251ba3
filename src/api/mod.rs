//! HTTP API for transaction forms, health and network discovery

mod defaults;

pub use defaults::FormDefaults;

use crate::chain::{ChainManager, NetworkSummary};
use crate::config::{ServerConfig, WalletConfig};
use crate::error::{ComposerError, ComposerResult};
use crate::session::{SessionStore, SessionView};
use crate::tx::RawFields;
use crate::wallet::Passphrase;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub chains: Arc<ChainManager>,
    pub wallet: Arc<WalletConfig>,
    pub dev_mode: bool,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/networks", get(list_networks))
        .route("/networks/:name/defaults", get(network_defaults))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/sign", post(sign))
        .route("/sessions/:id/broadcast", post(broadcast))
        .route("/sessions/:id/reset", post(reset))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ServerConfig, state: AppState) -> ComposerResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ComposerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ComposerError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

impl IntoResponse for ComposerError {
    fn into_response(self) -> Response {
        if !self.is_user_error() {
            warn!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.user_message(),
            field: self.field(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - every network answers
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let network_health = state.chains.health_check().await;
    let ready = network_health.iter().all(|(_, healthy)| *healthy);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            networks: network_health
                .into_iter()
                .map(|(network, healthy)| NetworkHealth { network, healthy })
                .collect(),
        }),
    )
}

async fn list_networks(State(state): State<AppState>) -> Json<Vec<NetworkSummary>> {
    Json(state.chains.summaries())
}

async fn network_defaults(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ComposerResult<Json<FormDefaults>> {
    let network = state.chains.get(Some(&name))?;
    Ok(Json(FormDefaults::for_network(
        &network,
        &state.wallet,
        state.dev_mode,
    )))
}

/// Open a form session. The body is optional.
async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> ComposerResult<(StatusCode, Json<SessionView>)> {
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ComposerError::validation("body", e.to_string()))?
    };

    let session = state.sessions.create(request.network.as_deref())?;
    Ok((StatusCode::CREATED, Json(session.view())))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ComposerResult<Json<SessionView>> {
    Ok(Json(state.sessions.get(id)?.view()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ComposerResult<StatusCode> {
    state.sessions.remove(id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SignRequest>,
) -> ComposerResult<Json<SessionView>> {
    let session = state.sessions.get(id)?;
    let passphrase = request
        .passphrase
        .filter(|p| !p.expose().is_empty())
        .or_else(|| state.wallet.passphrase.clone())
        .ok_or_else(|| ComposerError::validation("passphrase", "is required"))?;

    Ok(Json(session.sign(&request.fields, &passphrase).await?))
}

async fn broadcast(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ComposerResult<Json<SessionView>> {
    let session = state.sessions.get(id)?;
    Ok(Json(session.broadcast().await?))
}

async fn reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ComposerResult<Json<SessionView>> {
    let session = state.sessions.get(id)?;
    Ok(Json(session.reset()?))
}

// Request and response types

#[derive(Debug, Default, Deserialize)]
struct CreateSessionRequest {
    network: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignRequest {
    #[serde(flatten)]
    fields: RawFields,
    passphrase: Option<Passphrase>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    networks: Vec<NetworkHealth>,
}

#[derive(Serialize)]
struct NetworkHealth {
    network: String,
    healthy: bool,
}
