use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use crate::agents::plan::Plan;
use crate::agents::{Assistant, AssistantReply, ExecutionResult, SessionLedger};
use crate::config::RuntimeConfig;
use crate::runner::build_assistant;
use crate::telemetry::TelemetrySink;
use crate::tools::ToolSchema;

#[derive(Clone)]
pub struct ServerState {
    pub profile: String,
    pub assistant: Arc<Assistant>,
    pub ledger: Arc<Mutex<SessionLedger>>,
    pub telemetry: TelemetrySink,
}

impl ServerState {
    pub fn new(profile: String, assistant: Assistant, telemetry: TelemetrySink) -> Self {
        Self {
            profile,
            assistant: Arc::new(assistant),
            ledger: Arc::new(Mutex::new(SessionLedger::new())),
            telemetry,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServerHealthResponse {
    pub status: &'static str,
    pub profile: String,
    pub tools: usize,
}

#[derive(Debug, Deserialize)]
pub struct ServerPromptRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ServerPlanResponse {
    pub plan: Plan,
    pub cached: bool,
    pub rate_limited: bool,
    pub cost_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct ServerExecuteResponse {
    pub results: ExecutionResult,
    pub by_tool: Map<String, Value>,
    pub failures: usize,
    pub cached: bool,
}

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn require_prompt(request: &ServerPromptRequest, route: &str) -> Result<String, ApiError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("prompt cannot be empty for {route}"),
        ));
    }
    Ok(prompt.to_string())
}

pub async fn handle_server_health(State(state): State<Arc<ServerState>>) -> Json<ServerHealthResponse> {
    Json(ServerHealthResponse {
        status: "ok",
        profile: state.profile.clone(),
        tools: state.assistant.registry().len(),
    })
}

pub async fn handle_server_tools(State(state): State<Arc<ServerState>>) -> Json<Vec<ToolSchema>> {
    Json(state.assistant.tool_schemas())
}

pub async fn handle_server_plan(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ServerPromptRequest>,
) -> ApiResult<ServerPlanResponse> {
    let prompt = require_prompt(&request, "/v1/plan")?;

    let mut request_ledger = SessionLedger::new();
    let planned = state.assistant.plan(&prompt, &mut request_ledger).await;
    state.ledger.lock().await.merge(&request_ledger);

    Ok(Json(ServerPlanResponse {
        rate_limited: planned.failure.as_ref().is_some_and(|f| f.rate_limited),
        plan: planned.plan,
        cached: planned.cached,
        cost_usd: planned.cost_usd,
    }))
}

pub async fn handle_server_execute(
    State(state): State<Arc<ServerState>>,
    Json(plan): Json<Plan>,
) -> Json<ServerExecuteResponse> {
    let (results, cached) = state.assistant.execute(&plan).await;
    Json(ServerExecuteResponse {
        by_tool: results.by_tool(),
        failures: results.failure_count(),
        results,
        cached,
    })
}

pub async fn handle_server_ask(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<ServerPromptRequest>,
) -> ApiResult<AssistantReply> {
    let prompt = require_prompt(&request, "/v1/ask")?;
    let started_at = Instant::now();

    let mut request_ledger = SessionLedger::new();
    let reply = state.assistant.handle(&prompt, &mut request_ledger).await;
    state.ledger.lock().await.merge(&request_ledger);

    state.telemetry.emit(
        "server.ask.completed",
        json!({
            "steps": reply.plan.steps.len(),
            "failures": reply.results.failure_count(),
            "rate_limited": reply.rate_limited,
            "cost_usd": reply.cost_usd,
            "latency_ms": started_at.elapsed().as_millis() as u64,
        }),
    );

    Ok(Json(reply))
}

pub async fn handle_server_session(State(state): State<Arc<ServerState>>) -> Json<SessionLedger> {
    Json(state.ledger.lock().await.clone())
}

pub async fn handle_server_session_reset(
    State(state): State<Arc<ServerState>>,
) -> Json<SessionLedger> {
    let mut ledger = state.ledger.lock().await;
    ledger.reset();
    state.telemetry.emit("session.reset", json!({}));
    Json(ledger.clone())
}

pub fn build_server_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(handle_server_health))
        .route("/v1/tools", get(handle_server_tools))
        .route("/v1/plan", post(handle_server_plan))
        .route("/v1/execute", post(handle_server_execute))
        .route("/v1/ask", post(handle_server_ask))
        .route("/v1/session", get(handle_server_session))
        .route("/v1/session/reset", post(handle_server_session_reset))
        .with_state(state)
}

pub async fn run_server(
    cfg: RuntimeConfig,
    host: String,
    port: u16,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid server bind address '{}:{}'", host, port))?;
    let assistant = build_assistant(&cfg, telemetry)?;
    let state = Arc::new(ServerState::new(
        cfg.profile.clone(),
        assistant,
        telemetry.clone(),
    ));

    telemetry.emit(
        "server.started",
        json!({
            "host": host,
            "port": port,
            "profile": cfg.profile,
        }),
    );

    println!(
        "Server mode listening on http://{} (health: /healthz, tools: /v1/tools, plan: /v1/plan, execute: /v1/execute, ask: /v1/ask, session: /v1/session)",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind server listener")?;
    axum::serve(listener, build_server_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failed")
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { println!("\nReceived Ctrl+C, shutting down gracefully..."); }
        _ = terminate => { println!("\nReceived SIGTERM, shutting down gracefully..."); }
    }
}
