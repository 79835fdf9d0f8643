use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use tracing::instrument;

use crate::error::{AppError, RepoError};
use crate::models::{NewUser, User};
use crate::response::{ApiResponse, MessageData};
use crate::state::SharedState;

#[instrument(skip_all, fields(op = "handlers.user.create", request_id = %request_id(&headers)))]
pub async fn create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<ApiResponse<MessageData>, AppError> {
    let Json(user) = decode(body)?;
    tracing::info!(username = %user.username, "Request body decoded");

    let id = state.users.create(&user).await.map_err(|e| {
        if e == RepoError::Conflict {
            tracing::info!(username = %user.username, "User already exists");
        }
        AppError::from(e)
    })?;

    tracing::info!(id, username = %user.username, "User added");
    Ok(ApiResponse::ok(
        MessageData::new("user created successfully").with_id(id),
    ))
}

#[instrument(skip_all, fields(op = "handlers.user.get", request_id = %request_id(&headers)))]
pub async fn get(
    State(state): State<SharedState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Result<ApiResponse<User>, AppError> {
    let id = parse_id(path)?;

    let user = state.users.get_by_id(id).await?;

    tracing::info!(id, "Got user");
    Ok(ApiResponse::ok(user))
}

#[instrument(skip_all, fields(op = "handlers.user.update", request_id = %request_id(&headers)))]
pub async fn update(
    State(state): State<SharedState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<ApiResponse<MessageData>, AppError> {
    let Json(user) = decode(body)?;
    tracing::info!(username = %user.username, "Request body decoded");
    let id = parse_id(path)?;

    state.users.update_by_id(id, &user).await?;

    tracing::info!(id, "User updated");
    Ok(ApiResponse::ok(MessageData::new("user updated successfully")))
}

#[instrument(skip_all, fields(op = "handlers.user.delete", request_id = %request_id(&headers)))]
pub async fn delete(
    State(state): State<SharedState>,
    headers: HeaderMap,
    path: Result<Path<String>, PathRejection>,
) -> Result<ApiResponse<MessageData>, AppError> {
    let id = parse_id(path)?;

    state.users.delete_by_id(id).await?;

    tracing::info!(id, "User deleted");
    Ok(ApiResponse::ok(MessageData::new("user deleted successfully")))
}

fn decode(body: Result<Json<NewUser>, JsonRejection>) -> Result<Json<NewUser>, AppError> {
    body.map_err(|e| AppError::Malformed(format!("failed to decode request body: {}", e.body_text())))
}

/// Ids are unsigned on the wire. Anything past `i64::MAX` cannot exist in a
/// BIGSERIAL column, so it is reported as missing rather than malformed.
fn parse_id(path: Result<Path<String>, PathRejection>) -> Result<i64, AppError> {
    let Path(raw) = path.map_err(|e| AppError::Malformed(e.body_text()))?;
    let id: u64 = raw
        .parse()
        .map_err(|e| AppError::Malformed(format!("invalid user id '{raw}': {e}")))?;
    i64::try_from(id).map_err(|_| AppError::NotFound("user not found".to_string()))
}

fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}
