//! Request extractors: acting user, provider guard and validated JSON bodies

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::access::{authorize, Role};
use crate::error::AppError;
use crate::models::{User, Validate};
use crate::AppState;

/// Header carrying the id of the authenticated user
pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the user making the request, as established by the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthenticated("Token not provided".to_string()))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(ActingUser)
            .ok_or_else(|| AppError::Unauthenticated("Token invalid".to_string()))
    }
}

/// Acting user holding the provider role; rejects the request otherwise
#[derive(Debug, Clone)]
pub struct Provider(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Provider {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ActingUser(user_id) = ActingUser::from_request_parts(parts, state).await?;
        let user = authorize(state.repo.as_ref(), user_id, Role::Provider).await?;
        Ok(Provider(user))
    }
}

/// JSON body that has passed [`Validate`]
#[derive(Debug)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                AppError::Validation(format!("Validation fails: {}", rejection.body_text()))
            })?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}
