//! Recipient addresses

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::extract::{Provider, ValidJson};
use crate::error::{AppError, Result};
use crate::models::{CreateRecipientRequest, Recipient};
use crate::AppState;

pub async fn index(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Recipient>>> {
    Ok(Json(state.repo.list_recipients().await?))
}

pub async fn store(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    ValidJson(req): ValidJson<CreateRecipientRequest>,
) -> Result<Json<Recipient>> {
    let recipient = state.repo.create_recipient(req.into()).await?;
    Ok(Json(recipient))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if !state.repo.delete_recipient(id).await? {
        return Err(AppError::NotFound("This recipient does not exist".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
