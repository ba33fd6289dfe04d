//! Represents a file (blob) held by the external blob store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A blob as reported by the blob store.
///
/// Only the descriptor is kept here, never the content bytes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredBlob {
    /// Identifier generated by this service at upload time.
    pub id: String,

    /// Original file name. Unique across the bucket.
    pub name: String,

    /// Content type (MIME type), if the store recorded one.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: u64,

    /// When the store accepted the blob.
    pub created_at: DateTime<Utc>,
}

/// A file selected for upload.
#[derive(Clone, Debug)]
pub struct PictureUpload {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl PictureUpload {
    pub fn new(name: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type,
            bytes,
        }
    }
}
