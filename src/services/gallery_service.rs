//! src/services/gallery_service.rs
//!
//! GalleryService — the facade over the blob store and the document store.
//! Every operation returns a typed `GalleryResult`; deciding whether a
//! failure is shown, logged or replaced by a default is left to the caller.
//!
//! Creating a picture is two calls (store blob, write record) and deleting
//! one is two calls (delete record, delete blob). Nothing spans them, so a
//! failed second step is either compensated (`upload_picture`), reported
//! (`PartialDelete`) or cleaned up later by `reconcile`.

use crate::{
    backend::{BackendError, BlobStore, DocumentQuery, DocumentStore},
    models::{
        blob::{PictureUpload, StoredBlob},
        picture::{PictureDraft, PictureRecord, ValidationError, require},
    },
};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Batch size used when a caller wants every matching record.
const LIST_BATCH: usize = 100;
/// Upper bound for a single page requested through `search_page`.
pub const MAX_PAGE_SIZE: usize = 100;
/// Concurrent deletes issued by the orphan sweep.
const SWEEP_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("invalid picture: {0}")]
    Validation(#[from] ValidationError),
    #[error("a file named `{0}` already exists")]
    DuplicateName(String),
    #[error("record `{document_id}` deleted but blob `{image_id}` was left behind: {source}")]
    PartialDelete {
        document_id: String,
        image_id: String,
        source: BackendError,
    },
    #[error("{op} failed: {source}")]
    Backend {
        op: &'static str,
        source: BackendError,
    },
}

pub type GalleryResult<T> = Result<T, GalleryError>;

fn backend(op: &'static str) -> impl FnOnce(BackendError) -> GalleryError {
    move |source| GalleryError::Backend { op, source }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub term: String,
    pub page: usize,
    pub per_page: usize,
    pub total: u64,
    pub records: Vec<PictureRecord>,
}

/// Outcome of an orphan sweep.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub scanned: usize,
    pub orphaned: usize,
    pub removed: usize,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct GalleryService {
    blobs: Arc<dyn BlobStore>,
    documents: Arc<dyn DocumentStore>,
}

impl GalleryService {
    pub fn new(blobs: Arc<dyn BlobStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { blobs, documents }
    }

    /// Total number of picture records.
    pub async fn count(&self) -> GalleryResult<u64> {
        let page = self
            .documents
            .list(&DocumentQuery {
                name_prefix: None,
                limit: 1,
                offset: 0,
            })
            .await
            .map_err(backend("count"))?;
        Ok(page.total)
    }

    /// Every record whose name starts with `term`, in backend order.
    ///
    /// An empty term matches all records.
    pub async fn search(&self, term: &str) -> GalleryResult<Vec<PictureRecord>> {
        let mut query = DocumentQuery {
            name_prefix: prefix_filter(term),
            limit: LIST_BATCH,
            offset: 0,
        };
        let mut records = Vec::new();
        loop {
            let page = self
                .documents
                .list(&query)
                .await
                .map_err(backend("search"))?;
            let fetched = page.items.len();
            records.extend(page.items);
            if fetched == 0 || records.len() as u64 >= page.total {
                break;
            }
            query.offset += fetched;
        }
        debug!(term, found = records.len(), "search complete");
        Ok(records)
    }

    /// One page of matches. `page` is 1-based; `per_page` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub async fn search_page(
        &self,
        term: &str,
        page: usize,
        per_page: usize,
    ) -> GalleryResult<SearchPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        let result = self
            .documents
            .list(&DocumentQuery {
                name_prefix: prefix_filter(term),
                limit: per_page,
                offset: (page - 1) * per_page,
            })
            .await
            .map_err(backend("search"))?;
        Ok(SearchPage {
            term: term.to_string(),
            page,
            per_page,
            total: result.total,
            records: result.items,
        })
    }

    /// Store the file's bytes and return the generated blob id.
    ///
    /// Refuses names already present in the bucket. The check and the write
    /// are separate calls, so two concurrent uploads of one name can both
    /// pass it.
    pub async fn upload(&self, file: PictureUpload) -> GalleryResult<String> {
        let name = require("imageName", Some(file.name.clone()))?;

        let existing = self
            .blobs
            .find_by_name(&name)
            .await
            .map_err(backend("upload"))?;
        if let Some(blob) = existing {
            warn!(name = %name, existing = %blob.id, "upload rejected, name already stored");
            return Err(GalleryError::DuplicateName(name));
        }

        let blob_id = Uuid::new_v4().simple().to_string();
        let stored = self
            .blobs
            .create(&blob_id, file)
            .await
            .map_err(backend("upload"))?;
        info!(image_id = %stored.id, name = %stored.name, size = stored.size_bytes, "blob stored");
        Ok(stored.id)
    }

    /// Validate and write one picture record.
    pub async fn persist(
        &self,
        image_id: Option<String>,
        image_name: Option<String>,
        created_at: Option<DateTime<Utc>>,
    ) -> GalleryResult<PictureRecord> {
        let picture = PictureDraft {
            image_id,
            image_name,
            created_at,
        }
        .validate(Utc::now())?;

        let document_id = Uuid::new_v4().simple().to_string();
        let image_url = self.blobs.view_url(&picture.image_id);
        let record = self
            .documents
            .create(&document_id, &picture, &image_url)
            .await
            .map_err(backend("persist"))?;
        info!(document_id = %record.document_id, image_id = %record.image_id, "record written");
        Ok(record)
    }

    /// Delete the record, then the blob.
    pub async fn remove(
        &self,
        image_id: Option<String>,
        document_id: Option<String>,
    ) -> GalleryResult<()> {
        let image_id = require("imageId", image_id)?;
        let document_id = require("documentId", document_id)?;

        self.documents
            .delete(&document_id)
            .await
            .map_err(backend("remove"))?;

        if let Err(source) = self.blobs.delete(&image_id).await {
            error!(%document_id, %image_id, error = %source, "record deleted, blob left behind");
            return Err(GalleryError::PartialDelete {
                document_id,
                image_id,
                source,
            });
        }
        info!(%document_id, %image_id, "picture removed");
        Ok(())
    }

    /// Upload then persist, stamping the record with the current time.
    ///
    /// If the record cannot be written the stored blob is deleted again.
    /// When that delete fails too the blob stays orphaned until the next
    /// `reconcile`.
    pub async fn upload_picture(&self, file: PictureUpload) -> GalleryResult<PictureRecord> {
        let name = file.name.clone();
        let image_id = self.upload(file).await?;

        match self
            .persist(Some(image_id.clone()), Some(name), Some(Utc::now()))
            .await
        {
            Ok(record) => Ok(record),
            Err(err) => {
                match self.blobs.delete(&image_id).await {
                    Ok(()) => warn!(%image_id, error = %err, "persist failed, blob rolled back"),
                    Err(cleanup) => error!(
                        %image_id,
                        error = %err,
                        cleanup_error = %cleanup,
                        "persist failed and blob rollback failed, blob orphaned"
                    ),
                }
                Err(err)
            }
        }
    }

    /// Blob descriptor and bytes.
    pub async fn download(&self, image_id: &str) -> GalleryResult<(StoredBlob, Bytes)> {
        self.blobs
            .download(image_id)
            .await
            .map_err(backend("download"))
    }

    /// Delete blobs no record points at.
    ///
    /// Blobs younger than `grace` are skipped so an upload whose record is
    /// still being written is not swept.
    pub async fn reconcile(&self, grace: Duration) -> GalleryResult<ReconcileReport> {
        let mut blobs = Vec::new();
        loop {
            let page = self
                .blobs
                .list(LIST_BATCH, blobs.len())
                .await
                .map_err(backend("reconcile"))?;
            let fetched = page.items.len();
            blobs.extend(page.items);
            if fetched == 0 || blobs.len() as u64 >= page.total {
                break;
            }
        }

        let referenced: HashSet<String> = self
            .search("")
            .await?
            .into_iter()
            .map(|record| record.image_id)
            .collect();

        let cutoff = Utc::now() - grace;
        let orphans: Vec<StoredBlob> = blobs
            .iter()
            .filter(|blob| !referenced.contains(&blob.id) && blob.created_at <= cutoff)
            .cloned()
            .collect();

        let mut report = ReconcileReport {
            scanned: blobs.len(),
            orphaned: orphans.len(),
            ..ReconcileReport::default()
        };

        let outcomes: Vec<(String, Result<(), BackendError>)> = stream::iter(orphans)
            .map(|blob| async move {
                let outcome = self.blobs.delete(&blob.id).await;
                (blob.id, outcome)
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        for (image_id, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    debug!(%image_id, "orphaned blob removed");
                    report.removed += 1;
                }
                Err(BackendError::NotFound(_)) => {
                    debug!(%image_id, "orphaned blob already gone");
                    report.removed += 1;
                }
                Err(err) => {
                    warn!(%image_id, error = %err, "failed to remove orphaned blob");
                    report.failed.push(image_id);
                }
            }
        }

        info!(
            scanned = report.scanned,
            orphaned = report.orphaned,
            removed = report.removed,
            failed = report.failed.len(),
            "reconcile finished"
        );
        Ok(report)
    }
}

fn prefix_filter(term: &str) -> Option<String> {
    if term.is_empty() {
        None
    } else {
        Some(term.to_string())
    }
}
