//! User registration and profile

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use super::extract::{ActingUser, ValidJson};
use crate::error::{AppError, Result};
use crate::models::{CreateUserRequest, NewUser, UpdateUserRequest, User};
use crate::AppState;

pub async fn store(
    State(state): State<Arc<AppState>>,
    ValidJson(req): ValidJson<CreateUserRequest>,
) -> Result<Json<User>> {
    let user = state
        .repo
        .create_user(NewUser {
            name: req.name.unwrap_or_default(),
            email: req.email.unwrap_or_default(),
            provider: req.provider,
        })
        .await?;
    tracing::info!(user_id = user.id, provider = user.provider, "User registered");
    Ok(Json(user))
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    ActingUser(_): ActingUser,
) -> Result<Json<Vec<User>>> {
    Ok(Json(state.repo.list_users().await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    ActingUser(user_id): ActingUser,
    ValidJson(req): ValidJson<UpdateUserRequest>,
) -> Result<Json<User>> {
    let user = state
        .repo
        .update_user(user_id, req.name, req.email)
        .await?
        .ok_or(AppError::UnknownUser(user_id))?;
    Ok(Json(user))
}
