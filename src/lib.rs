pub mod aggregate;
pub mod config;
pub mod error;
pub mod jira;
pub mod metrics;
pub mod querier;
pub mod report;
pub mod status;
pub mod tracker;
pub mod types;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use config::AppConfig;
use error::FetchError;
use querier::ReportQuerier;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use types::ProjectKey;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Service for fetching and analysing projects.
    pub querier: ReportQuerier,
}

impl AppState {
    /// Initializes the application state with a Jira-backed querier.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let querier = ReportQuerier::new(config)?;
        Ok(Self { querier })
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/projects/{key}/report", get(get_project_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "issueflow",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_project_report(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<aggregate::ProjectReport>, (StatusCode, String)> {
    let project = ProjectKey::new(key);
    if !project.is_valid() {
        tracing::warn!("Rejected invalid project key: {:?}", project.as_str());
        return Err((StatusCode::BAD_REQUEST, "Invalid Project Key".to_string()));
    }
    match state.querier.report(&project).await {
        Ok(report) => {
            tracing::debug!(project = %project, "Returning report");
            Ok(Json(report))
        }
        Err(e) => {
            tracing::error!("Failed to build report for {}: {}", project, e);
            Err(fetch_error_response(&e))
        }
    }
}

fn fetch_error_response(e: &FetchError) -> (StatusCode, String) {
    if let FetchError::InvalidProjectKey(_) = e {
        return (StatusCode::BAD_REQUEST, "Invalid Project Key".to_string());
    }
    if e.is_rate_limited() {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Tracker Rate Limit Exceeded".to_string(),
        );
    }
    if e.is_not_found() {
        return (StatusCode::NOT_FOUND, "Project Not Found".to_string());
    }
    if e.is_upstream_unavailable() {
        return (
            StatusCode::BAD_GATEWAY,
            "Issue Tracker Unavailable".to_string(),
        );
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".to_string(),
    )
}
