//! HTTP surface
//!
//! Everything except user registration and the health check requires an
//! acting user; mutating routes additionally require the provider role,
//! enforced by the [`extract::Provider`] extractor.

pub mod deliveries;
pub mod deliverymen;
pub mod extract;
pub mod files;
pub mod orders;
pub mod problems;
pub mod recipients;
pub mod users;

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;

use crate::AppState;
use extract::ActingUser;

/// Rejects requests that carry no acting user
async fn require_acting_user(request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    if let Err(rejection) = ActingUser::from_request_parts(&mut parts, &()).await {
        return rejection.into_response();
    }
    next.run(Request::from_parts(parts, body)).await
}

async fn health() -> &'static str {
    "ok"
}

pub fn routes() -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/files", post(files::store))
        .route("/recipients", get(recipients::index).post(recipients::store))
        .route("/recipients/:id", delete(recipients::delete))
        .route("/deliveryman", get(deliverymen::index).post(deliverymen::store))
        .route(
            "/deliveryman/:id",
            delete(deliverymen::delete).put(deliverymen::update),
        )
        .route("/deliveryman/:id/deliveries", get(deliverymen::deliveries))
        .route("/deliveryman/:id/orders", get(orders::index))
        .route("/deliveries", get(deliveries::index).post(deliveries::store))
        .route("/deliveries/problems", get(problems::index))
        .route(
            "/deliveries/:id",
            get(deliveries::show)
                .put(deliveries::update)
                .delete(deliveries::cancel),
        )
        .route(
            "/deliveries/:id/order",
            post(orders::pick_up).delete(orders::complete),
        )
        .route("/deliveries/:id/problems", post(problems::store))
        .route("/delivery/:id/problems", get(problems::show))
        .route("/problem/:id/cancel-delivery", delete(problems::cancel_delivery))
        .route_layer(middleware::from_fn(require_acting_user));

    Router::new()
        .route("/health", get(health))
        // Registration is open; listing and profile updates take the acting user themselves
        .route(
            "/users",
            post(users::store).get(users::index).put(users::update),
        )
        .merge(protected)
}
