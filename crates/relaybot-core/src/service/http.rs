use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::channel::dingtalk::{DingTalkChannel, DingTalkWebhook};
use crate::channel::Channel;
use crate::config::Config;
use crate::error::RelaybotError;
use crate::provider::{create_provider, LlmProvider};
use crate::service::commands::{Command, CommandRouter};
use crate::service::runner::{send_reply, spawn_llm_task};
use crate::service::tasks::{InFlightTasks, TaskInfo};
use crate::tool::storage::QiniuStorage;
use crate::tool::Dispatcher;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const ACK_TEXT: &str = "Thinking, please wait... ⏳";

/// Shared application state for the HTTP gateway.
pub struct AppState {
    pub config: Config,
    pub agent: Arc<Agent>,
    pub channel: Arc<dyn Channel>,
    pub storage: Arc<QiniuStorage>,
    pub tasks: Arc<InFlightTasks>,
    pub commands: CommandRouter,
}

impl AppState {
    pub fn new(config: Config, agent: Arc<Agent>, channel: Arc<dyn Channel>) -> Self {
        let storage = Arc::new(QiniuStorage::new(config.tools.storage.clone()));
        let commands = CommandRouter::new(&config.dingtalk.keyword);
        Self {
            config,
            agent,
            channel,
            storage,
            tasks: Arc::new(InFlightTasks::new()),
            commands,
        }
    }

    /// Wire the real provider, DingTalk channel and tool handlers.
    pub fn from_config(config: Config) -> Result<Self, RelaybotError> {
        config.validate()?;
        let channel: Arc<dyn Channel> = Arc::new(DingTalkChannel::new(config.dingtalk.clone()));
        let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(&config.agent)?);
        let dispatcher = Arc::new(Dispatcher::new(&config.tools, channel.clone()));
        let agent = Arc::new(Agent::new(provider, dispatcher, &config.agent));
        Ok(Self::new(config, agent, channel))
    }

    fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.config.gateway.stuck_after_secs)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: f64,
    pub active_tasks: usize,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub active_tasks_count: usize,
    pub server_time: f64,
    pub active_tasks: BTreeMap<String, TaskInfo>,
}

/// Create the axum Router with all gateway routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route(
            "/dingtalk/webhook",
            get(handle_webhook_status).post(handle_webhook),
        )
        .route("/debug/tasks", get(handle_debug_tasks))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
                .allow_headers([http::header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

async fn handle_root() -> &'static str {
    "relaybot is running ✅"
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: crate::SERVICE_NAME.to_string(),
        timestamp: epoch_seconds(),
        active_tasks: state.tasks.len(),
        version: crate::VERSION.to_string(),
    })
}

async fn handle_debug_tasks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_tasks = state.tasks.snapshot(state.stuck_after());
    Json(TasksResponse {
        active_tasks_count: active_tasks.len(),
        server_time: epoch_seconds(),
        active_tasks,
    })
}

async fn handle_webhook_status() -> impl IntoResponse {
    Json(json!({"status": "running"}))
}

/// DingTalk outgoing-robot callback.
async fn handle_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let payload: DingTalkWebhook = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!("Rejected webhook body ({} bytes): {}", body.len(), e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": format!("invalid JSON: {e}")})),
            )
                .into_response();
        }
    };

    let Some(msg) = payload.into_inbound() else {
        info!("Ignoring webhook without text content");
        return Json(json!({"success": true})).into_response();
    };
    info!(
        "DingTalk message from {} in {}: {}",
        msg.sender_id,
        msg.conversation_id,
        crate::util::truncate_string(&msg.content, 80, "...")
    );

    match state.commands.route(&msg.content) {
        Command::Llm(prompt) => {
            send_reply(&state, ACK_TEXT, &msg.at_user_ids).await;
            spawn_llm_task(state.clone(), msg.conversation_id, prompt, msg.at_user_ids);
            Json(json!({"success": true, "status": "processing"})).into_response()
        }
        command => {
            let reply = state.commands.reply(&command);
            send_reply(&state, &reply, &msg.at_user_ids).await;
            Json(json!({"success": true})).into_response()
        }
    }
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
