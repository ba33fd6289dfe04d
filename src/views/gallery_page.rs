//! Server-rendered gallery page.
//!
//! Renders a [`PageSnapshot`] as one HTML document: search form, upload
//! form, counters, and a grid of picture cards. The result list is sliced
//! into pages here; the controller keeps the whole list.

use crate::{models::picture::PictureRecord, services::page_controller::PageSnapshot};
use askama::Template;

pub const PLACEHOLDER_PATH: &str = "/assets/placeholder.svg";

pub const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="320" height="200" viewBox="0 0 320 200">"##,
    r##"<rect width="320" height="200" fill="#f1f1f1"/>"##,
    r##"<circle cx="110" cy="80" r="22" fill="#c8c8c8"/>"##,
    r##"<path d="M40 170 L130 100 L190 150 L230 120 L290 170 Z" fill="#b4b4b4"/>"##,
    r##"<text x="160" y="192" font-family="sans-serif" font-size="14" text-anchor="middle" fill="#888">No pictures</text>"##,
    r##"</svg>"##
);

/// The slice of results shown on one page.
#[derive(Debug, PartialEq)]
pub struct PageWindow<'a> {
    /// 1-based, clamped to the available pages.
    pub page: usize,
    pub total_pages: usize,
    pub items: &'a [PictureRecord],
}

/// Slice `results` for `page` (1-based). An empty list has one empty page.
pub fn paginate(results: &[PictureRecord], page: usize, per_page: usize) -> PageWindow<'_> {
    let per_page = per_page.max(1);
    let total_pages = results.len().div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(results.len());
    PageWindow {
        page,
        total_pages,
        items: &results[start..end],
    }
}

/// One picture card, with its timestamps already formatted.
pub struct CardView<'a> {
    pub image_id: &'a str,
    pub document_id: &'a str,
    pub image_name: &'a str,
    pub image_url: &'a str,
    pub iso: String,
    pub display: String,
}

impl<'a> From<&'a PictureRecord> for CardView<'a> {
    fn from(record: &'a PictureRecord) -> Self {
        Self {
            image_id: &record.image_id,
            document_id: &record.document_id,
            image_name: &record.image_name,
            image_url: &record.image_url,
            iso: record.created_at.to_rfc3339(),
            display: record.created_at.format("%b %-d, %Y %H:%M").to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "gallery.html")]
pub struct GalleryTemplate<'a> {
    pub query: &'a str,
    pub total: u64,
    pub uploading: &'a [String],
    pub loading: bool,
    /// Ask the browser to reload while state is still settling.
    pub refresh_hint: bool,
    pub placeholder: &'static str,
    pub cards: Vec<CardView<'a>>,
    pub page: usize,
    pub total_pages: usize,
    pub prev_page: Option<usize>,
    pub next_page: Option<usize>,
}

impl<'a> GalleryTemplate<'a> {
    pub fn new(snapshot: &'a PageSnapshot, page: usize, per_page: usize) -> Self {
        let window = paginate(&snapshot.results, page, per_page);
        Self {
            query: &snapshot.query,
            total: snapshot.total,
            uploading: &snapshot.uploading,
            loading: snapshot.loading,
            refresh_hint: snapshot.pending || snapshot.loading || !snapshot.uploading.is_empty(),
            placeholder: PLACEHOLDER_PATH,
            cards: window.items.iter().map(CardView::from).collect(),
            page: window.page,
            total_pages: window.total_pages,
            prev_page: (window.page > 1).then(|| window.page - 1),
            next_page: (window.page < window.total_pages).then(|| window.page + 1),
        }
    }
}

/// Render the full page.
pub fn render_page(
    snapshot: &PageSnapshot,
    page: usize,
    per_page: usize,
) -> askama::Result<String> {
    GalleryTemplate::new(snapshot, page, per_page).render()
}
