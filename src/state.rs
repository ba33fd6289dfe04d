//! Shared state handed to every handler.

use crate::services::{gallery_service::GalleryService, page_controller::PageController};

#[derive(Clone)]
pub struct AppState {
    /// Direct access to the backend facade (JSON API, probes, sweeps).
    pub service: GalleryService,

    /// The page's state machine, shared by the HTML page and `/api/state`.
    pub controller: PageController,

    /// Cards per gallery page.
    pub page_size: usize,

    /// Minimum blob age before the orphan sweep may delete it.
    pub orphan_grace: chrono::Duration,
}
