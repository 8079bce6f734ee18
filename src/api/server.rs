use crate::api::metrics::{TriageMetrics, CONTENT_TYPE};
use crate::config::AppConfig;
use crate::core::runner::TriageAgent;
use crate::domain::model::{
    AgentRun, Decision, NewAgentRun, Review, ReviewStatus, Ticket, TicketInput, TriageOutput,
};
use crate::domain::ports::TicketStore;
use crate::utils::error::{ErrorCategory, Result, TriageError};
use crate::utils::validation::Validate;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

const DEFAULT_REVIEW_LIMIT: usize = 50;

pub struct AppState {
    pub agent: TriageAgent,
    pub store: Arc<dyn TicketStore>,
    pub metrics: TriageMetrics,
}

impl AppState {
    pub fn new(agent: TriageAgent, store: Arc<dyn TicketStore>) -> Self {
        Self {
            agent,
            store,
            metrics: TriageMetrics::new(),
        }
    }
}

/// 錯誤回應一律為 `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, detail)
    }

    pub fn not_found(detail: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }
}

impl From<TriageError> for ApiError {
    fn from(err: TriageError) -> Self {
        let status = match err.category() {
            _ if matches!(err, TriageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ErrorCategory::Input => StatusCode::UNPROCESSABLE_ENTITY,
            // LLM 或檢索失敗屬於上游問題
            ErrorCategory::Network | ErrorCategory::Model => StatusCode::BAD_GATEWAY,
            ErrorCategory::Storage if matches!(err, TriageError::RetrievalError { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            ErrorCategory::Storage | ErrorCategory::Configuration => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                category = ?err.category(),
                "❌ Request failed: {}",
                err
            );
        }
        Self::new(status, err.user_friendly_message())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn default_channel() -> String {
    "api".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketCreate {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl TicketCreate {
    pub fn into_input(self) -> TicketInput {
        TicketInput {
            subject: self.subject,
            body: self.body,
            customer_email: self.customer_email,
            channel: self.channel,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketProcessResponse {
    pub ticket: Ticket,
    pub agent_run: AgentRun,
    pub review: Option<Review>,
    pub pipeline_output: TriageOutput,
}

#[derive(Debug, Serialize)]
pub struct TicketDetailResponse {
    pub ticket: Ticket,
    pub latest_agent_run: Option<AgentRun>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ApproveParams {
    pub final_reply: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectParams {
    pub reviewer_notes: String,
}

pub async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], state.metrics.render())
}

/// 存 ticket → 執行 agent → 存 agent run → 非 auto_send 時建立待審核 review
pub async fn handle_create_ticket(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<TicketCreate>, JsonRejection>,
) -> ApiResult<TicketProcessResponse> {
    let Json(payload) = payload?;
    let input = payload.into_input();
    input.validate()?;
    state.metrics.ticket_received();

    let ticket = state.store.create_ticket(&input)?;
    tracing::info!(ticket_id = ticket.id, channel = %ticket.channel, "📥 Ticket stored");

    let output = state.agent.run(input).await?;
    state.metrics.agent_run_completed(output.latency_ms);

    let agent_run = state
        .store
        .create_agent_run(&NewAgentRun::from_output(ticket.id, &output))?;

    let decision = output.decision.decision;
    state.metrics.record_decision(decision);

    // 實際寄信不在此服務範圍，auto_send 只記錄決策
    let review = if decision == Decision::AutoSend {
        None
    } else {
        let review = state
            .store
            .create_review(agent_run.id, ReviewStatus::Pending, None, None)?;
        tracing::info!(review_id = review.id, decision = %decision, "📝 Review queued");
        Some(review)
    };

    Ok(Json(TicketProcessResponse {
        ticket,
        agent_run,
        review,
        pipeline_output: output,
    }))
}

pub async fn handle_get_ticket(
    State(state): State<Arc<AppState>>,
    ticket_id: std::result::Result<Path<i64>, PathRejection>,
) -> ApiResult<TicketDetailResponse> {
    let Path(ticket_id) = ticket_id?;
    let ticket = state
        .store
        .get_ticket(ticket_id)?
        .ok_or_else(|| ApiError::not_found("Ticket not found"))?;
    let latest_agent_run = state.store.get_latest_agent_run(ticket_id)?;

    Ok(Json(TicketDetailResponse {
        ticket,
        latest_agent_run,
    }))
}

pub async fn handle_list_reviews(
    State(state): State<Arc<AppState>>,
    params: std::result::Result<Query<ReviewListParams>, QueryRejection>,
) -> ApiResult<Vec<Review>> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_REVIEW_LIMIT);
    Ok(Json(state.store.list_pending_reviews(limit)?))
}

pub async fn handle_approve_review(
    State(state): State<Arc<AppState>>,
    review_id: std::result::Result<Path<i64>, PathRejection>,
    params: std::result::Result<Query<ApproveParams>, QueryRejection>,
) -> ApiResult<Review> {
    let Path(review_id) = review_id?;
    let Query(params) = params?;
    let review = state
        .store
        .approve_review(review_id, &params.final_reply)?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    tracing::info!(review_id, "✅ Review approved");
    Ok(Json(review))
}

pub async fn handle_reject_review(
    State(state): State<Arc<AppState>>,
    review_id: std::result::Result<Path<i64>, PathRejection>,
    params: std::result::Result<Query<RejectParams>, QueryRejection>,
) -> ApiResult<Review> {
    let Path(review_id) = review_id?;
    let Query(params) = params?;
    let review = state
        .store
        .reject_review(review_id, &params.reviewer_notes)?
        .ok_or_else(|| ApiError::not_found("Review not found"))?;
    tracing::info!(review_id, "🚫 Review rejected");
    Ok(Json(review))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/tickets", post(handle_create_ticket))
        .route("/tickets/{ticket_id}", get(handle_get_ticket))
        .route("/reviews", get(handle_list_reviews))
        .route("/reviews/{review_id}/approve", post(handle_approve_review))
        .route("/reviews/{review_id}/reject", post(handle_reject_review))
        .with_state(state)
}

pub async fn serve(config: &AppConfig, state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port)
        .parse::<SocketAddr>()
        .map_err(|e| TriageError::InvalidConfigValueError {
            field: "server.host".to_string(),
            value: format!("{}:{}", config.server.host, config.server.port),
            reason: e.to_string(),
        })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 Support triage API listening on http://{}", addr);
    println!(
        "Listening on http://{} (health: /health, metrics: /metrics, tickets: /tickets)",
        addr
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { tracing::info!("Received Ctrl+C, shutting down gracefully..."); }
        _ = terminate => { tracing::info!("Received SIGTERM, shutting down gracefully..."); }
    }
}
