//! HTTP tool server.
//!
//! Serves the [`ToolRegistry`] over a small JSON API. Tool results are
//! always text; failures inside a tool come back as `"Error: …"` in the
//! `result` field, while routing and parameter problems use the error
//! envelope below.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | Registered tools with parameter schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `GET`  | `/health` | Version, tool count and read-only flag |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "missing required parameter: query" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::service::MemoryService;
use crate::tools::{run_tool, ToolContext, ToolRegistry};

#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

/// Build the router. Separate from [`run_server`] so tests can drive it
/// without binding a socket.
pub fn router(service: Arc<MemoryService>) -> Router {
    let registry = ToolRegistry::with_memory_tools(service.read_only());
    let state = AppState {
        ctx: ToolContext::new(service),
        tools: Arc::new(registry),
    };

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process exits.
pub async fn run_server(service: Arc<MemoryService>) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "tool server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Errors ============

/// Failures that happen before a tool runs. Failures inside a tool are
/// part of the tool's text result instead.
#[derive(Debug)]
enum ApiError {
    UnknownTool(String),
    InvalidParams(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::UnknownTool(name) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no tool registered with name: {}", name),
            ),
            ApiError::InvalidParams(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(json!({ "error": { "code": code, "message": message } }))).into_response()
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    tools: usize,
    read_only: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tools: state.tools.len(),
        read_only: state.ctx.service().read_only(),
    })
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.tools.infos() }))
}

/// `404` for an unknown tool, `400` for parameters that fail the schema.
async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let Some(tool) = state.tools.find(&name) else {
        return Err(ApiError::UnknownTool(name));
    };
    let text = run_tool(tool, params, &state.ctx)
        .await
        .map_err(|e| ApiError::InvalidParams(e.to_string()))?;
    Ok(Json(json!({ "result": text })))
}
