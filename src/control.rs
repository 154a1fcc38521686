use crate::audit::AuditEntry;
use crate::error::{OrchestratorError, Result};
use crate::models::*;
use crate::state::*;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

const ACTOR_HEADER: &str = "x-actor";
const DEFAULT_ACTOR: &str = "control-api";

/// Orchestration error rendered as a JSON body.
pub struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_invalid_input() => StatusCode::BAD_REQUEST,
            OrchestratorError::ServerNotFound { .. }
            | OrchestratorError::ConfigurationNotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::ServiceNotActive { .. }
            | OrchestratorError::Transport { .. }
            | OrchestratorError::UnexpectedOutput { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            success: false,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn actor(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}

fn audit<T: serde::Serialize>(
    state: &AppState,
    headers: &HeaderMap,
    action: &str,
    entity: &str,
    before: Option<Value>,
    result: &Result<T>,
) {
    let after = match result {
        Ok(value) => serde_json::to_value(value).unwrap_or_default(),
        Err(e) => json!({ "error": e.to_string() }),
    };
    let mut entry = AuditEntry::new(actor(headers), action, entity);
    if let Some(before) = before {
        entry = entry.before(before);
    }
    state.audit.record(entry.after(after));
}

/// An unknown or inactive host is not an error for lifecycle calls: the
/// back office gets a simulated outcome and nothing is provisioned.
fn outcome(result: Result<OperationOutcome>) -> std::result::Result<Json<OperationOutcome>, ApiError> {
    match result {
        Ok(outcome) => Ok(Json(outcome)),
        Err(OrchestratorError::ServerNotFound { host }) => {
            tracing::warn!("Server {} not found or inactive, provisioning skipped", host);
            Ok(Json(OperationOutcome::simulated(format!(
                "server {host} not found or inactive; provisioning skipped"
            ))))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn sync(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SyncRequest>,
) -> StatusCode {
    let servers = req.servers.len();
    state.inventory.replace_servers(req.servers);
    state
        .inventory
        .replace_accounts(req.reseller_usernames, req.streaming_logins);

    let active = state.inventory.active_server_count();
    let accounts = state.inventory.account_name_count();
    tracing::info!(
        "Sync complete: {} servers ({} active), {} account names",
        servers,
        active,
        accounts
    );
    state.audit.record(
        AuditEntry::new(actor(&headers), "inventory.sync", "inventory").after(json!({
            "servers": servers,
            "active_servers": active,
            "account_names": accounts,
        })),
    );
    StatusCode::OK
}

pub async fn put_server(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(host): Path<String>,
    Json(req): Json<ServerUpsert>,
) -> StatusCode {
    let record = ServerRecord {
        host_address: host.clone(),
        admin_secret: req.admin_secret,
        control_port: req.control_port,
        status: req.status,
    };
    tracing::info!("Server {} set to {:?}", host, record.status);
    state.audit.record(
        AuditEntry::new(actor(&headers), "server.upsert", &host)
            .after(json!({ "control_port": record.control_port, "status": record.status })),
    );
    state.inventory.upsert_server(record);
    StatusCode::OK
}

pub async fn delete_server(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(host): Path<String>,
) -> StatusCode {
    if state.inventory.remove_server(&host) {
        tracing::info!("Server {} removed", host);
        state
            .audit
            .record(AuditEntry::new(actor(&headers), "server.remove", &host));
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn put_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<CreateAccountRequest>,
) -> std::result::Result<Json<OperationOutcome>, ApiError> {
    let account = account_from(name, req)?;
    let result = state.orchestrator.create(&account).await;
    audit(&state, &headers, "account.create", account.name.as_str(), None, &result);
    outcome(result)
}

pub async fn patch_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<UpdateAccountRequest>,
) -> std::result::Result<Json<OperationOutcome>, ApiError> {
    let name = AccountName::parse(name)?;
    // The secret itself stays out of the audit trail.
    let before = json!({
        "host": req.host,
        "max_bitrate_kbps": req.update.max_bitrate_kbps,
        "max_viewers": req.update.max_viewers,
        "publish_secret_changed": req.update.publish_secret.is_some(),
    });
    let result = state.orchestrator.update(&name, &req.host, &req.update).await;
    audit(&state, &headers, "account.update", name.as_str(), Some(before), &result);
    outcome(result)
}

pub async fn put_password(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<PasswordRequest>,
) -> std::result::Result<Json<OperationOutcome>, ApiError> {
    let name = AccountName::parse(name)?;
    let result = state
        .orchestrator
        .update_password(&name, &req.host, &req.publish_secret)
        .await;
    audit(&state, &headers, "account.password", name.as_str(), None, &result);
    outcome(result)
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(params): Query<HostParams>,
) -> std::result::Result<Json<OperationOutcome>, ApiError> {
    let name = AccountName::parse(name)?;
    let before = json!({ "host": params.host });
    let result = state.orchestrator.remove(&name, &params.host).await;
    audit(&state, &headers, "account.remove", name.as_str(), Some(before), &result);
    outcome(result)
}

pub async fn sync_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<CreateAccountRequest>,
) -> std::result::Result<Json<OperationOutcome>, ApiError> {
    let account = account_from(name, req)?;
    let result = state.orchestrator.sync(&account).await;
    audit(&state, &headers, "account.sync", account.name.as_str(), None, &result);
    outcome(result)
}

pub async fn create_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<HostParams>,
) -> std::result::Result<Json<BackupResponse>, ApiError> {
    let name = AccountName::parse(name)?;
    let result = state.orchestrator.backup(&name, &req.host).await;
    audit(&state, &headers, "account.backup", name.as_str(), None, &result);
    Ok(Json(BackupResponse {
        success: true,
        backup_path: result?,
    }))
}

pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<RestoreRequest>,
) -> std::result::Result<Json<OperationOutcome>, ApiError> {
    let name = AccountName::parse(name)?;
    let before = json!({ "host": req.host, "backup_path": req.backup_path });
    let result = state
        .orchestrator
        .restore(&name, &req.host, &req.backup_path)
        .await;
    audit(&state, &headers, "account.restore", name.as_str(), Some(before), &result);
    outcome(result)
}

pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(host): Path<String>,
) -> std::result::Result<Json<CleanupReport>, ApiError> {
    let result = state.orchestrator.cleanup_orphans(&host).await;
    audit(&state, &headers, "server.cleanup", &host, None, &result);
    Ok(Json(result?))
}

fn account_from(name: String, req: CreateAccountRequest) -> Result<AccountConfig> {
    Ok(AccountConfig::new(AccountName::parse(name)?, req.host, req.publish_secret)
        .with_limits(req.max_bitrate_kbps, req.max_viewers))
}
