//! Ports to the external backend-as-a-service.
//!
//! The gallery never stores anything itself: blobs go to a bucket behind
//! [`BlobStore`], picture records go to a collection behind
//! [`DocumentStore`]. `appwrite` talks to the real service over REST;
//! `memory` is a process-local stand-in for development and tests.

pub mod appwrite;
pub mod memory;

use crate::models::{
    blob::{PictureUpload, StoredBlob},
    picture::{PictureRecord, ValidPicture},
};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected backend payload: {0}")]
    Decode(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// One page of a listing plus the total number of matches.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub total: u64,
    pub items: Vec<T>,
}

/// Filter and window for a document listing.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// Keep only records whose `imageName` starts with this value.
    pub name_prefix: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// Object storage bucket holding picture bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Look up a blob by its file name.
    async fn find_by_name(&self, name: &str) -> BackendResult<Option<StoredBlob>>;

    /// Store `upload` under `blob_id`.
    async fn create(&self, blob_id: &str, upload: PictureUpload) -> BackendResult<StoredBlob>;

    /// Fetch a blob's bytes.
    async fn download(&self, blob_id: &str) -> BackendResult<(StoredBlob, Bytes)>;

    async fn delete(&self, blob_id: &str) -> BackendResult<()>;

    async fn list(&self, limit: usize, offset: usize) -> BackendResult<Page<StoredBlob>>;

    /// URL a browser can load the blob from.
    fn view_url(&self, blob_id: &str) -> String;
}

/// Document collection holding picture records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, query: &DocumentQuery) -> BackendResult<Page<PictureRecord>>;

    /// Write one record under `document_id`.
    async fn create(
        &self,
        document_id: &str,
        picture: &ValidPicture,
        image_url: &str,
    ) -> BackendResult<PictureRecord>;

    async fn delete(&self, document_id: &str) -> BackendResult<()>;
}
