//! FastFeet server - package delivery management backend

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod store;
pub mod uploads;
pub mod views;

use std::sync::Arc;

use axum::Router;
use mockable::{Clock, DefaultClock};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::lifecycle::{DeliveryLifecycle, LifecyclePolicy};
use crate::notify::Notifier;
use crate::store::{Repository, SqliteStore};
use crate::uploads::FileStorage;

/// Application state shared across handlers
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub lifecycle: DeliveryLifecycle,
    pub files: FileStorage,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn Repository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        files: FileStorage,
        policy: LifecyclePolicy,
    ) -> Arc<Self> {
        let lifecycle = DeliveryLifecycle::new(repo.clone(), notifier, clock, policy);
        Arc::new(Self {
            repo,
            lifecycle,
            files,
        })
    }

    /// SQLite-backed state running on the system clock
    pub fn with_pool(
        pool: SqlitePool,
        notifier: Arc<dyn Notifier>,
        files: FileStorage,
        policy: LifecyclePolicy,
    ) -> Arc<Self> {
        Self::new(
            Arc::new(SqliteStore::new(pool)),
            notifier,
            Arc::new(DefaultClock),
            files,
            policy,
        )
    }
}

/// Full application router with tracing and CORS layers
pub fn app(state: Arc<AppState>) -> Router {
    api::routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
