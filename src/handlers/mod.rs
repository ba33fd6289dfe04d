//! HTTP handlers. Storage concerns stay in the services; handlers only
//! translate between HTTP and the controller or facade.

pub mod gallery_handlers;
pub mod health_handlers;
pub mod picture_handlers;

use crate::{errors::AppError, models::blob::PictureUpload};
use axum::extract::Multipart;

/// Pull the `file` field out of an upload form.
///
/// A form without a selected file yields an upload with an empty name,
/// which the facade rejects as a missing field.
pub async fn read_upload(mut multipart: Multipart) -> Result<PictureUpload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        return Ok(PictureUpload::new(name, content_type, bytes));
    }
    Err(AppError::bad_request("missing `file` field"))
}
