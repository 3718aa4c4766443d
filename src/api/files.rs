//! Multipart uploads

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;

use crate::error::{AppError, Result};
use crate::models::File;
use crate::AppState;

/// Form field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

/// Pulls the `file` field out of a multipart body, if there is one
pub async fn read_file_field(multipart: Option<Multipart>) -> Result<Option<(String, Vec<u8>)>> {
    let Some(mut multipart) = multipart else {
        return Ok(None);
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or(FILE_FIELD).to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?;
        return Ok(Some((name, bytes.to_vec())));
    }

    Ok(None)
}

pub async fn store(
    State(state): State<Arc<AppState>>,
    multipart: Option<Multipart>,
) -> Result<Json<File>> {
    let (name, bytes) = read_file_field(multipart)
        .await?
        .ok_or_else(|| AppError::Validation("File not provided".to_string()))?;

    let upload = state.files.store(&name, &bytes).await?;
    let file = state.repo.create_file(upload.into()).await?;
    Ok(Json(file))
}
