use crate::agent::Agent;
use crate::auth::ApiKeyGate;
use crate::config::ServerConfig;
use crate::engine::AgentEngine;
use crate::error::RequestError;
use crate::protocol::InvokeRequest;
use crate::session::StreamSession;
use crate::transport::{BoundedTransport, StreamingTransport, Transport};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Everything a request needs, shared read-only across requests.
pub struct AppState {
    gate: ApiKeyGate,
    engine: Arc<dyn AgentEngine>,
    streaming: StreamingTransport,
    bounded: BoundedTransport,
    queue_capacity: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig, engine: Arc<dyn AgentEngine>) -> Self {
        Self {
            gate: ApiKeyGate::new(&config.api_key),
            engine,
            streaming: StreamingTransport::new(config.stream_timeout),
            bounded: BoundedTransport::new(config.gateway_timeout, config.gateway_flush),
            queue_capacity: config.queue_capacity,
        }
    }
}

pub fn router(state: AppState) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    axum::Router::new()
        .route("/", get(health))
        .route("/invoke", post(invoke_streaming))
        .route("/gateway/invoke", post(invoke_bounded))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let engine = Arc::new(Agent::from_config(&config));
    let app = router(AppState::new(&config, engine));

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("finagent listening on http://{}", config.listen);
    info!(
        stream_timeout = ?config.stream_timeout,
        gateway_timeout = ?config.gateway_timeout,
        gateway_flush = ?config.gateway_flush,
        model = %config.model,
        "serving /invoke and /gateway/invoke"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn invoke_streaming(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Response {
    accept(&state, &state.streaming, &headers, payload).await
}

async fn invoke_bounded(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Response {
    accept(&state, &state.bounded, &headers, payload).await
}

/// Gate and validate a request, then hand a fresh session to `transport`.
async fn accept<T: Transport>(
    state: &AppState,
    transport: &T,
    headers: &HeaderMap,
    payload: Result<Json<InvokeRequest>, JsonRejection>,
) -> Response {
    if let Err(err) = state.gate.authorize(headers) {
        return err.into_response();
    }

    let query = match validate(payload) {
        Ok(query) => query,
        Err(err) => {
            tracing::debug!(error = %err, "rejected request body");
            return err.into_response();
        }
    };

    let session = StreamSession::start(Arc::clone(&state.engine), query, state.queue_capacity);
    info!(session = %session.id(), "accepted query");
    transport.respond(session).await
}

fn validate(payload: Result<Json<InvokeRequest>, JsonRejection>) -> Result<String, RequestError> {
    let Json(request) = payload.map_err(|rejection| RequestError::Validation(rejection.body_text()))?;
    if request.query.trim().is_empty() {
        return Err(RequestError::Validation("query must not be empty".to_string()));
    }
    Ok(request.query)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
