use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::admin::{Admin, SourceHealth};
use crate::config::ConfigSummary;
use crate::error::{AdminError, SyncError};
use crate::model::{SourceId, SyncRun};

/// Shared state of the ops router.
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<Admin>,
    pub config: ConfigSummary,
}

/// Ops surface: liveness, per-source health, run history and manual sync.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sources", get(sources))
        .route("/sources/{id}/runs", get(runs))
        .route("/sources/{id}/sync", post(sync_now))
        .route("/config", get(config))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    sources: usize,
    enabled: usize,
    failing: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let all = state.admin.health();
    Json(HealthOut {
        status: "ok",
        sources: all.len(),
        enabled: all.iter().filter(|s| s.enabled).count(),
        failing: all.iter().filter(|s| s.consecutive_errors > 0).count(),
    })
}

async fn sources(State(state): State<AppState>) -> Json<Vec<SourceHealth>> {
    Json(state.admin.health())
}

#[derive(Deserialize)]
struct RunsParams {
    #[serde(default = "default_runs_limit")]
    limit: usize,
}

fn default_runs_limit() -> usize {
    20
}

async fn runs(
    State(state): State<AppState>,
    Path(id): Path<SourceId>,
    Query(p): Query<RunsParams>,
) -> Json<Vec<SyncRun>> {
    Json(state.admin.runs_for(id, p.limit.clamp(1, 200)))
}

async fn sync_now(State(state): State<AppState>, Path(id): Path<SourceId>) -> Response {
    match state.admin.sync_now(id).await {
        Ok(run) => Json(run).into_response(),
        Err(e) => error_response(e),
    }
}

async fn config(State(state): State<AppState>) -> Json<ConfigSummary> {
    Json(state.config)
}

#[derive(Serialize)]
struct ErrorOut {
    error: String,
}

fn error_response(e: AdminError) -> Response {
    let status = match &e {
        AdminError::UnknownSource(_) | AdminError::Sync(SyncError::UnknownSource(_)) => {
            StatusCode::NOT_FOUND
        }
        AdminError::Sync(SyncError::AlreadyRunning(_) | SyncError::Disabled(_)) => {
            StatusCode::CONFLICT
        }
        AdminError::Invalid(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorOut {
            error: e.to_string(),
        }),
    )
        .into_response()
}
