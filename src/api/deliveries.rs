//! Delivery registration, reassignment and listing

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use super::extract::{Provider, ValidJson};
use crate::error::Result;
use crate::models::{DeliveryRequest, DeliveryResponse, DeliveryView};
use crate::views;
use crate::AppState;

pub async fn index(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DeliveryResponse>>> {
    let deliveries = views::all_deliveries(state.repo.as_ref()).await?;
    Ok(Json(deliveries.into_iter().map(Into::into).collect()))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeliveryView>> {
    Ok(Json(views::delivery_view(state.repo.as_ref(), id).await?))
}

pub async fn store(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    ValidJson(req): ValidJson<DeliveryRequest>,
) -> Result<Json<DeliveryResponse>> {
    let delivery = state.lifecycle.create(req.into()).await?;
    Ok(Json(delivery.into()))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<DeliveryRequest>,
) -> Result<Json<DeliveryResponse>> {
    let delivery = state.lifecycle.reassign(id, req.into()).await?;
    Ok(Json(delivery.into()))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
) -> Result<Json<DeliveryResponse>> {
    let delivery = state.lifecycle.cancel(id).await?;
    Ok(Json(delivery.into()))
}
