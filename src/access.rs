//! Authorization guard for privileged operations

use crate::error::{AppError, Result};
use crate::models::User;
use crate::store::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Provider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Provider => "provider",
        }
    }

    fn held_by(&self, user: &User) -> bool {
        match self {
            Role::Provider => user.provider,
        }
    }
}

/// Loads the acting user and checks that it holds `role`.
///
/// A missing user record is reported as [`AppError::UnknownUser`], separate
/// from [`AppError::Forbidden`]: the caller presented an identity the store
/// does not know about.
pub async fn authorize(repo: &dyn Repository, user_id: i64, role: Role) -> Result<User> {
    let user = repo
        .find_user(user_id)
        .await?
        .ok_or(AppError::UnknownUser(user_id))?;

    if !role.held_by(&user) {
        tracing::debug!(user_id, role = role.as_str(), "Authorization denied");
        return Err(AppError::Forbidden(format!("User is not a {}", role.as_str())));
    }

    Ok(user)
}
