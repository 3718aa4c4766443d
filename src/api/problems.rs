//! Delivery problems and cancellation

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use super::extract::{Provider, ValidJson};
use crate::error::Result;
use crate::models::{DeliveryProblem, DeliveryResponse, DeliveryWithProblems, ReportProblemRequest};
use crate::views;
use crate::AppState;

/// Canceled deliveries
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Json<Vec<DeliveryResponse>>> {
    let deliveries = views::canceled_deliveries(state.repo.as_ref()).await?;
    Ok(Json(deliveries.into_iter().map(Into::into).collect()))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeliveryWithProblems>> {
    Ok(Json(views::delivery_with_problems(state.repo.as_ref(), id).await?))
}

pub async fn store(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
    ValidJson(req): ValidJson<ReportProblemRequest>,
) -> Result<Json<DeliveryProblem>> {
    let description = req.description.unwrap_or_default();
    let problem = state
        .lifecycle
        .report_problem(id, description.trim())
        .await?;
    Ok(Json(problem))
}

pub async fn cancel_delivery(
    State(state): State<Arc<AppState>>,
    Provider(_): Provider,
    Path(id): Path<i64>,
) -> Result<Json<DeliveryResponse>> {
    let delivery = state.lifecycle.cancel(id).await?;
    Ok(Json(delivery.into()))
}
