//! In-process blob and document stores.
//!
//! Used by `--backend memory` for local runs and by the test suites. Listing
//! order is insertion order, the same default the hosted backend applies to
//! freshly created documents. Name matching is case-sensitive.

use super::{BackendError, BackendResult, BlobStore, DocumentQuery, DocumentStore, Page};
use crate::models::{
    blob::{PictureUpload, StoredBlob},
    picture::{PictureRecord, ValidPicture},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::RwLock;

/// Switches that make the next matching call fail with
/// [`BackendError::Unavailable`]. Each stays set until cleared.
#[derive(Debug, Default)]
pub struct Faults {
    pub blob_create: AtomicBool,
    pub blob_delete: AtomicBool,
    pub blob_list: AtomicBool,
    pub document_create: AtomicBool,
    pub document_delete: AtomicBool,
    pub document_list: AtomicBool,
}

impl Faults {
    fn check(flag: &AtomicBool, op: &str) -> BackendResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable(format!("injected failure in {op}")))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct Inner {
    blobs: RwLock<Vec<(StoredBlob, Bytes)>>,
    documents: RwLock<Vec<PictureRecord>>,
    view_base: String,
    faults: Faults,
    document_lists: AtomicUsize,
    blob_creates: AtomicUsize,
}

/// Shared handle; clones see the same data.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// `view_base` prefixes generated view URLs, e.g. `http://host/api/blobs`.
    pub fn new(view_base: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                view_base: view_base.into().trim_end_matches('/').to_string(),
                ..Inner::default()
            }),
        }
    }

    #[cfg(test)]
    pub fn faults(&self) -> &Faults {
        &self.inner.faults
    }

    #[cfg(test)]
    /// Number of document listings served so far.
    pub fn document_lists(&self) -> usize {
        self.inner.document_lists.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    /// Number of blobs created so far.
    pub fn blob_creates(&self) -> usize {
        self.inner.blob_creates.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub async fn blob_count(&self) -> usize {
        self.inner.blobs.read().await.len()
    }

    #[cfg(test)]
    /// Insert a blob with a chosen descriptor, bypassing the upload path.
    pub async fn seed_blob(&self, blob: StoredBlob, bytes: Bytes) {
        self.inner.blobs.write().await.push((blob, bytes));
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn find_by_name(&self, name: &str) -> BackendResult<Option<StoredBlob>> {
        Faults::check(&self.inner.faults.blob_list, "blob lookup")?;
        let blobs = self.inner.blobs.read().await;
        Ok(blobs
            .iter()
            .find(|(blob, _)| blob.name == name)
            .map(|(blob, _)| blob.clone()))
    }

    async fn create(&self, blob_id: &str, upload: PictureUpload) -> BackendResult<StoredBlob> {
        Faults::check(&self.inner.faults.blob_create, "blob create")?;
        let mut blobs = self.inner.blobs.write().await;
        if blobs.iter().any(|(blob, _)| blob.id == blob_id) {
            return Err(BackendError::Status {
                status: 409,
                message: format!("blob `{blob_id}` already exists"),
            });
        }
        let blob = StoredBlob {
            id: blob_id.to_string(),
            name: upload.name,
            content_type: upload.content_type,
            size_bytes: upload.bytes.len() as u64,
            created_at: Utc::now(),
        };
        blobs.push((blob.clone(), upload.bytes));
        self.inner.blob_creates.fetch_add(1, Ordering::SeqCst);
        Ok(blob)
    }

    async fn download(&self, blob_id: &str) -> BackendResult<(StoredBlob, Bytes)> {
        let blobs = self.inner.blobs.read().await;
        blobs
            .iter()
            .find(|(blob, _)| blob.id == blob_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(blob_id.to_string()))
    }

    async fn delete(&self, blob_id: &str) -> BackendResult<()> {
        Faults::check(&self.inner.faults.blob_delete, "blob delete")?;
        let mut blobs = self.inner.blobs.write().await;
        let before = blobs.len();
        blobs.retain(|(blob, _)| blob.id != blob_id);
        if blobs.len() == before {
            return Err(BackendError::NotFound(blob_id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, limit: usize, offset: usize) -> BackendResult<Page<StoredBlob>> {
        Faults::check(&self.inner.faults.blob_list, "blob list")?;
        let blobs = self.inner.blobs.read().await;
        Ok(Page {
            total: blobs.len() as u64,
            items: blobs
                .iter()
                .skip(offset)
                .take(limit)
                .map(|(blob, _)| blob.clone())
                .collect(),
        })
    }

    fn view_url(&self, blob_id: &str) -> String {
        format!("{}/{}", self.inner.view_base, blob_id)
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn list(&self, query: &DocumentQuery) -> BackendResult<Page<PictureRecord>> {
        self.inner.document_lists.fetch_add(1, Ordering::SeqCst);
        Faults::check(&self.inner.faults.document_list, "document list")?;
        let documents = self.inner.documents.read().await;
        let matching: Vec<&PictureRecord> = documents
            .iter()
            .filter(|doc| match &query.name_prefix {
                Some(prefix) => doc.image_name.starts_with(prefix.as_str()),
                None => true,
            })
            .collect();
        Ok(Page {
            total: matching.len() as u64,
            items: matching
                .into_iter()
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
        })
    }

    async fn create(
        &self,
        document_id: &str,
        picture: &ValidPicture,
        image_url: &str,
    ) -> BackendResult<PictureRecord> {
        Faults::check(&self.inner.faults.document_create, "document create")?;
        let record = PictureRecord {
            document_id: document_id.to_string(),
            image_id: picture.image_id.clone(),
            image_name: picture.image_name.clone(),
            created_at: picture.created_at,
            image_url: image_url.to_string(),
        };
        self.inner.documents.write().await.push(record.clone());
        Ok(record)
    }

    async fn delete(&self, document_id: &str) -> BackendResult<()> {
        Faults::check(&self.inner.faults.document_delete, "document delete")?;
        let mut documents = self.inner.documents.write().await;
        let before = documents.len();
        documents.retain(|doc| doc.document_id != document_id);
        if documents.len() == before {
            return Err(BackendError::NotFound(document_id.to_string()));
        }
        Ok(())
    }
}
