use crate::control::ApiError;
use crate::models::*;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_servers: state.inventory.active_server_count(),
        valid_accounts: state.inventory.account_name_count(),
    })
}

pub async fn server_status(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Result<Json<ServiceStatus>, ApiError> {
    let status = state.orchestrator.status(&host).await?;
    Ok(Json(status))
}

pub async fn server_configurations(
    State(state): State<Arc<AppState>>,
    Path(host): Path<String>,
) -> Result<Json<ConfigurationsResponse>, ApiError> {
    let configurations = state.orchestrator.list_configurations(&host).await?;
    Ok(Json(ConfigurationsResponse {
        host,
        configurations,
    }))
}
