//! Pickup and hand-over of deliveries by their deliveryman

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;

use super::extract::Provider;
use super::files::read_file_field;
use crate::error::{AppError, Result};
use crate::models::DeliveryResponse;
use crate::views;
use crate::AppState;

/// Deliveries the deliveryman still has to pick up or hand over
pub async fn index(
    State(state): State<Arc<AppState>>,
    Path(deliveryman_id): Path<i64>,
) -> Result<Json<Vec<DeliveryResponse>>> {
    let orders = views::active_orders(state.repo.as_ref(), deliveryman_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

pub async fn pick_up(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
) -> Result<Json<DeliveryResponse>> {
    let delivery = state.lifecycle.pick_up(id).await?;
    Ok(Json(delivery.into()))
}

pub async fn complete(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
    multipart: Option<Multipart>,
) -> Result<Json<DeliveryResponse>> {
    let (name, bytes) = read_file_field(multipart)
        .await?
        .ok_or_else(|| AppError::Validation("Signature not provided".to_string()))?;

    // Nothing is written to disk for a delivery that cannot be completed
    state.lifecycle.ensure_completable(id).await?;

    let upload = state.files.store(&name, &bytes).await?;
    match state.lifecycle.complete(id, upload.clone().into()).await {
        Ok(delivery) => Ok(Json(delivery.into())),
        Err(e) => {
            state.files.discard(&upload).await;
            Err(e)
        }
    }
}
