use crate::core::config::ServerConfig;
use crate::core::error::{ErrorKind, StoryError};
use crate::core::state::StateSnapshot;
use crate::services::agent::{AgentRouter, RunInput, RunOutput, ToolSpec};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<AgentRouter>,
}

/// Error body: `{"error": {"message": ..., "kind": ...}}`.
pub struct ApiError(StoryError);

impl From<StoryError> for ApiError {
    fn from(e: StoryError) -> Self {
        Self(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::MissingInput => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Network | ErrorKind::Api | ErrorKind::MalformedResponse => StatusCode::BAD_GATEWAY,
        ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(json!({
                "error": {
                    "message": self.0.to_string(),
                    "kind": kind,
                }
            })),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct PutStateRequest {
    values: Map<String, Value>,
    #[serde(default)]
    expected_version: Option<u64>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/state", get(get_state).put(put_state))
        .route("/agent/run", post(run_agent))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolSpec>> {
    Json(state.agent.registry().all().to_vec())
}

async fn get_state(State(state): State<AppState>) -> Json<StateSnapshot> {
    Json(state.agent.state().snapshot().await)
}

async fn put_state(
    State(state): State<AppState>,
    Json(req): Json<PutStateRequest>,
) -> Result<Json<StateSnapshot>, ApiError> {
    let store = state.agent.state();
    store.replace(req.values, req.expected_version).await?;
    Ok(Json(store.snapshot().await))
}

async fn run_agent(
    State(state): State<AppState>,
    Json(input): Json<RunInput>,
) -> Result<Json<RunOutput>, ApiError> {
    Ok(Json(state.agent.run(input).await?))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down server");
}

/// Serves the agent API until Ctrl-C.
pub async fn serve(config: &ServerConfig, agent: Arc<AgentRouter>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Agent server listening on http://{}", addr);
    axum::serve(listener, app(AppState { agent }))
        .with_graceful_shutdown(shutdown_signal())
        .await
}
