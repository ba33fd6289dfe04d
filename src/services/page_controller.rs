//! Page state and the transitions that drive it.
//!
//! Keystrokes update `query` immediately; a debounce timer commits the
//! latest value into `debounced_query`. A change of the debounced query, of
//! `total`, or of `refresh_signal` triggers a fetch.
//!
//! Fetches carry a ticket from a monotonically increasing counter. Only the
//! response holding the newest ticket is applied, so a slow response to an
//! older query cannot overwrite newer results. `loading` is derived from a
//! count of in-flight fetches, each held by a guard that releases on drop.
//!
//! One controller backs the whole server: every browser viewing the page
//! sees and drives the same query, results and counters.

use crate::{
    models::{blob::PictureUpload, picture::PictureRecord},
    services::gallery_service::{GalleryError, GalleryResult, GalleryService},
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex as SyncMutex, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct PageState {
    query: String,
    debounced_query: String,
    refresh_signal: bool,
    results: Vec<PictureRecord>,
    total: u64,
}

/// Read-only copy of the page state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub query: String,
    pub debounced_query: String,
    pub loading: bool,
    /// Typed input that the debounce timer has not committed yet.
    pub pending: bool,
    pub refresh_signal: bool,
    pub results: Vec<PictureRecord>,
    pub total: u64,
    /// Names of the files currently being uploaded, oldest first.
    pub uploading: Vec<String>,
}

struct Inner {
    service: GalleryService,
    debounce: Duration,
    state: Mutex<PageState>,
    keystrokes: AtomicU64,
    tickets: AtomicU64,
    in_flight: AtomicUsize,
    upload_ids: AtomicU64,
    uploads: SyncMutex<BTreeMap<u64, String>>,
}

/// Marks one fetch as in flight until dropped.
struct LoadingGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(in_flight: &'a AtomicUsize) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One entry in the uploading list, removed when the upload step ends.
struct UploadSlot<'a> {
    uploads: &'a SyncMutex<BTreeMap<u64, String>>,
    id: u64,
}

impl<'a> UploadSlot<'a> {
    fn open(inner: &'a Inner, name: &str) -> Self {
        let id = inner.upload_ids.fetch_add(1, Ordering::SeqCst);
        inner
            .uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, name.to_string());
        Self {
            uploads: &inner.uploads,
            id,
        }
    }
}

impl Drop for UploadSlot<'_> {
    fn drop(&mut self) {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[derive(Clone)]
pub struct PageController {
    inner: Arc<Inner>,
}

impl PageController {
    pub fn new(service: GalleryService, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                debounce,
                state: Mutex::new(PageState::default()),
                keystrokes: AtomicU64::new(0),
                tickets: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                upload_ids: AtomicU64::new(0),
                uploads: SyncMutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Load the total and the initial (unfiltered) result list.
    pub async fn init(&self) {
        self.sync_total().await;
        self.refresh().await;
    }

    /// Record a keystroke and (re)arm the debounce timer.
    pub async fn input(&self, query: impl Into<String>) {
        let query = query.into();
        self.inner.state.lock().await.query = query;
        let generation = self.inner.keystrokes.fetch_add(1, Ordering::SeqCst) + 1;

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.inner.debounce).await;
            if this.inner.keystrokes.load(Ordering::SeqCst) != generation {
                return;
            }
            this.commit_query().await;
        });
    }

    /// Copy `query` into `debounced_query`, fetching if it changed.
    async fn commit_query(&self) {
        let changed = {
            let mut state = self.inner.state.lock().await;
            if state.debounced_query == state.query {
                false
            } else {
                state.debounced_query = state.query.clone();
                true
            }
        };
        if changed {
            self.refresh().await;
        }
    }

    /// Fetch results for the current debounced query.
    ///
    /// Returns `true` if this fetch's response was applied.
    pub async fn refresh(&self) -> bool {
        let ticket = self.inner.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = LoadingGuard::acquire(&self.inner.in_flight);

        let term = self.inner.state.lock().await.debounced_query.clone();
        debug!(ticket, term = %term, "fetching pictures");
        let fetched = self.inner.service.search(&term).await;

        let mut state = self.inner.state.lock().await;
        if self.inner.tickets.load(Ordering::SeqCst) != ticket {
            debug!(ticket, "discarding superseded response");
            return false;
        }
        state.results = match fetched {
            Ok(records) => records,
            Err(err) => {
                warn!(ticket, term = %term, error = %err, "fetch failed, showing no results");
                Vec::new()
            }
        };
        true
    }

    /// Reload `total` from the backend. A failed count shows as 0.
    pub async fn sync_total(&self) {
        let total = match self.inner.service.count().await {
            Ok(total) => total,
            Err(err) => {
                warn!(error = %err, "count failed, showing 0");
                0
            }
        };
        self.inner.state.lock().await.total = total;
    }

    /// Upload a file and write its record, then bump the total and refetch.
    pub async fn upload(&self, file: PictureUpload) -> GalleryResult<PictureRecord> {
        let slot = UploadSlot::open(&self.inner, &file.name);

        let outcome = self.inner.service.upload_picture(file).await;
        drop(slot);

        match &outcome {
            Ok(record) => {
                info!(image_id = %record.image_id, name = %record.image_name, "upload complete");
                self.inner.state.lock().await.total += 1;
                self.refresh().await;
            }
            Err(err) => warn!(error = %err, "upload failed"),
        }
        outcome
    }

    /// Delete a picture, then flip the refresh signal and refetch.
    ///
    /// A partial delete still removed the record, so the list is refreshed
    /// in that case too.
    pub async fn delete(&self, image_id: &str, document_id: &str) -> GalleryResult<()> {
        let outcome = self
            .inner
            .service
            .remove(Some(image_id.to_string()), Some(document_id.to_string()))
            .await;

        let record_gone = match &outcome {
            Ok(()) => true,
            Err(GalleryError::PartialDelete { .. }) => true,
            Err(err) => {
                warn!(image_id, document_id, error = %err, "delete failed");
                false
            }
        };
        if record_gone {
            {
                let mut state = self.inner.state.lock().await;
                state.refresh_signal = !state.refresh_signal;
                state.total = state.total.saturating_sub(1);
            }
            self.refresh().await;
        }
        outcome
    }

    pub fn loading(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Names of in-progress uploads, in the order they started.
    pub fn uploading(&self) -> Vec<String> {
        self.inner
            .uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> PageSnapshot {
        let state = self.inner.state.lock().await;
        PageSnapshot {
            query: state.query.clone(),
            debounced_query: state.debounced_query.clone(),
            loading: self.loading(),
            pending: state.query != state.debounced_query,
            refresh_signal: state.refresh_signal,
            results: state.results.clone(),
            total: state.total,
            uploading: self.uploading(),
        }
    }
}
