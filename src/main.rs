//! FastFeet server - package delivery management backend

use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fastfeet::config::Config;
use fastfeet::notify::{HttpMailer, LogNotifier, Notifier};
use fastfeet::store::sqlite;
use fastfeet::uploads::FileStorage;
use fastfeet::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fastfeet=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    let policy = config.lifecycle_policy().map_err(|e| anyhow!(e))?;

    // Database connection
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    sqlite::migrate(&pool).await?;

    let notifier: Arc<dyn Notifier> = match &config.mail_relay_url {
        Some(url) => {
            tracing::info!("Sending mail through relay at {}", url);
            Arc::new(HttpMailer::new(url.clone(), config.mail_from.clone()))
        }
        None => {
            tracing::warn!("MAIL_RELAY_URL not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState::with_pool(
        pool,
        notifier,
        FileStorage::new(config.uploads_dir.clone()),
        policy,
    );
    let app = fastfeet::app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
