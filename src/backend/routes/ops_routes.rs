/**
 * Operational Routes
 * 
 * Backup tooling and introspection. These routes are meant for operators and
 * should only be reachable from inside the deployment.
 * 
 * - `GET /ops/health` - cache and mirror status
 * - `GET /ops/cache/stats` - `CacheStats`
 * - `POST /ops/backup` - run a full backup now
 * - `POST /ops/export` - write the mirror to a JSON file inside the configured
 *   export directory, body `{"file": "name.json"}`
 * - `POST /ops/restore` - always 501
 * - `POST /ops/queue/drain` - run one write-behind drain cycle
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::cache::{CacheClient, CacheStats};
use crate::backend::error::BackendError;
use crate::backend::replication::ReplicationSync;
use crate::backend::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    /// Bare file name, resolved against `AppConfig::export_dir`
    pub file: String,
}

/// Resolve an export file name inside `dir`.
///
/// Only plain names made of ASCII letters, digits, `-`, `_` and `.` are
/// accepted, and they may not start with `.`. Separators, `..` and absolute
/// paths are rejected.
pub fn export_file_path(dir: &Path, file: &str) -> Result<PathBuf, BackendError> {
    let file = file.trim();
    if file.is_empty() {
        return Err(BackendError::handler(StatusCode::BAD_REQUEST, "file must not be empty"));
    }

    let plain = file
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !plain || file.starts_with('.') {
        return Err(BackendError::handler(
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a plain file name", file),
        ));
    }

    Ok(dir.join(file))
}

pub fn configure_ops_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/ops/health", axum::routing::get(health))
        .route("/ops/cache/stats", axum::routing::get(cache_stats))
        .route("/ops/backup", axum::routing::post(run_backup))
        .route("/ops/export", axum::routing::post(run_export))
        .route("/ops/restore", axum::routing::post(run_restore))
        .route("/ops/queue/drain", axum::routing::post(drain_queue))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "cache_connected": state.cache.is_connected(),
        "mirror_configured": state.replication.is_configured().await,
    }))
}

pub async fn cache_stats(State(cache): State<Arc<CacheClient>>) -> Json<CacheStats> {
    Json(cache.get_stats().await)
}

/// # Errors
///
/// * `503 Service Unavailable` - mirror or primary store not configured
/// * `500 Internal Server Error` - the backup ran and at least one step failed
pub async fn run_backup(State(replication): State<Arc<ReplicationSync>>) -> Result<Json<Value>, BackendError> {
    if !replication.is_configured().await {
        return Err(BackendError::not_configured("backup mirror"));
    }
    if !replication.has_source() {
        return Err(BackendError::not_configured("primary store"));
    }

    if replication.full_backup().await {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(BackendError::failed("full backup"))
    }
}

pub async fn run_export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<Value>, BackendError> {
    let path = export_file_path(&state.config.export_dir, &request.file)?;
    if !state.replication.is_configured().await {
        return Err(BackendError::not_configured("backup mirror"));
    }

    if state.replication.export_to_json(&path).await {
        Ok(Json(json!({ "success": true, "path": path.display().to_string() })))
    } else {
        Err(BackendError::failed("export"))
    }
}

pub async fn run_restore(State(replication): State<Arc<ReplicationSync>>) -> Result<Json<Value>, BackendError> {
    replication.restore().await;
    Err(BackendError::NotImplemented {
        message: "restore from the backup mirror must be done manually, in foreign-key order".to_string(),
    })
}

pub async fn drain_queue(State(state): State<AppState>) -> Result<Json<Value>, BackendError> {
    let Some(drainer) = state.drainer.as_ref() else {
        return Err(BackendError::not_configured("primary store"));
    };

    match drainer.drain_once().await {
        Ok(persisted) => Ok(Json(json!({ "persisted": persisted }))),
        Err(_) => Err(BackendError::failed("queue drain")),
    }
}
