//! JSON handlers for the REST routes

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::ApiError;
use super::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ExecuteRequest {
    pub command: Option<String>,
    pub timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TransferRequest {
    pub local_path: Option<String>,
    pub remote_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListRequest {
    pub remote_path: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

/// Present and non-empty, or a 400 naming the field
fn required(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::MissingField(field))
}

pub(crate) async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

pub(crate) async fn execute_handler(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = required(req.command, "command")?;
    let result = state.session.execute_command(&command, req.timeout).await?;
    Ok(Json(json!({ "success": true, "result": result })))
}

pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let local_path = required(req.local_path, "localPath")?;
    let remote_path = required(req.remote_path, "remotePath")?;
    state.session.upload_file(&local_path, &remote_path).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("File uploaded from {local_path} to {remote_path}"),
    })))
}

pub(crate) async fn download_handler(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let remote_path = required(req.remote_path, "remotePath")?;
    let local_path = required(req.local_path, "localPath")?;
    state.session.download_file(&remote_path, &local_path).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("File downloaded from {remote_path} to {local_path}"),
    })))
}

pub(crate) async fn list_handler(
    State(state): State<AppState>,
    Json(req): Json<ListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let remote_path = required(req.remote_path, "remotePath")?;
    let files = state.session.list_directory(&remote_path).await?;
    Ok(Json(json!({ "success": true, "files": files })))
}

pub(crate) async fn system_info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let info = state.session.get_system_info().await;
    Json(json!({ "success": true, "info": info }))
}

pub(crate) async fn processes_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let processes = state.session.list_processes().await?;
    Ok(Json(json!({ "success": true, "processes": processes })))
}
