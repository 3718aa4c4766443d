//! Deliveryman registration and maintenance

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::extract::{Provider, ValidJson};
use crate::error::{AppError, Result};
use crate::models::{DeliveryResponse, Deliveryman, DeliverymanRequest, NewDeliveryman};
use crate::store::Repository;
use crate::views;
use crate::AppState;

async fn ensure_avatar(repo: &dyn Repository, avatar_id: Option<i64>) -> Result<()> {
    if let Some(id) = avatar_id {
        if repo.find_file(id).await?.is_none() {
            return Err(AppError::NotFound("This avatar does not exist".to_string()));
        }
    }
    Ok(())
}

pub async fn index(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Deliveryman>>> {
    Ok(Json(state.repo.list_deliverymen().await?))
}

pub async fn deliveries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DeliveryResponse>>> {
    let deliveries = views::deliveries_for_deliveryman(state.repo.as_ref(), id).await?;
    Ok(Json(deliveries.into_iter().map(Into::into).collect()))
}

pub async fn store(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    ValidJson(req): ValidJson<DeliverymanRequest>,
) -> Result<Json<Deliveryman>> {
    let new: NewDeliveryman = req.into();

    if state.repo.find_deliveryman_by_email(&new.email).await?.is_some() {
        return Err(AppError::Conflict("Deliveryman already exists".to_string()));
    }
    ensure_avatar(state.repo.as_ref(), new.avatar_id).await?;

    let deliveryman = state.repo.create_deliveryman(new).await?;
    tracing::info!(deliveryman_id = deliveryman.id, "Deliveryman registered");
    Ok(Json(deliveryman))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<DeliverymanRequest>,
) -> Result<Json<Deliveryman>> {
    let new: NewDeliveryman = req.into();

    if state.repo.find_deliveryman(id).await?.is_none() {
        return Err(AppError::NotFound("This deliveryman does not exist".to_string()));
    }
    ensure_avatar(state.repo.as_ref(), new.avatar_id).await?;

    let deliveryman = state
        .repo
        .update_deliveryman(id, new)
        .await?
        .ok_or_else(|| AppError::NotFound("This deliveryman does not exist".to_string()))?;
    Ok(Json(deliveryman))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if !state.repo.delete_deliveryman(id).await? {
        return Err(AppError::NotFound("This deliveryman does not exist".to_string()));
    }
    tracing::info!(deliveryman_id = id, "Deliveryman removed");
    Ok(StatusCode::NO_CONTENT)
}
