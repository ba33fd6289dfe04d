//! Represents a picture's metadata record as kept by the document store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata for one uploaded picture.
///
/// The record lives in the document store; the bytes live in the blob store
/// under `image_id`. The two are written and deleted by separate calls, so a
/// record may outlive its blob or the other way around.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PictureRecord {
    /// Identifier of the metadata document.
    pub document_id: String,

    /// Identifier of the blob holding the image bytes.
    pub image_id: String,

    /// Original file name; display title and prefix-search field.
    pub image_name: String,

    /// Upload time.
    pub created_at: DateTime<Utc>,

    /// Retrieval reference for the blob, resolved once at write time.
    pub image_url: String,
}

/// Fields accepted by `persist` before validation.
#[derive(Clone, Debug, Default)]
pub struct PictureDraft {
    pub image_id: Option<String>,
    pub image_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A draft that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidPicture {
    pub image_id: String,
    pub image_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    #[error("createdAt {created_at} is in the future (now {now})")]
    FutureTimestamp {
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

impl PictureDraft {
    #[cfg(test)]
    pub fn new(
        image_id: impl Into<String>,
        image_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            image_id: Some(image_id.into()),
            image_name: Some(image_name.into()),
            created_at: Some(created_at),
        }
    }

    /// Check that every field is present and `created_at` is not after `now`.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidPicture, ValidationError> {
        let image_id = require("imageId", self.image_id)?;
        let image_name = require("imageName", self.image_name)?;
        let created_at = self
            .created_at
            .ok_or(ValidationError::MissingField("createdAt"))?;

        if created_at > now {
            return Err(ValidationError::FutureTimestamp { created_at, now });
        }

        Ok(ValidPicture {
            image_id,
            image_name,
            created_at,
        })
    }
}

/// Require a non-blank string field.
pub fn require(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::MissingField(field)),
    }
}
