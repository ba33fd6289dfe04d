//! HTML page and the plain-form endpoints behind it.
//!
//! Form posts feed the page controller and redirect back to `/`. Failures
//! are logged by the controller and never shown on the page.

use crate::{
    errors::AppError,
    handlers::read_upload,
    state::AppState,
    views::gallery_page::{PLACEHOLDER_SVG, render_page},
};
use axum::{
    Form,
    extract::{Multipart, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect},
};
use serde::Deserialize;
use tracing::{debug, error, warn};

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteForm {
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub document_id: String,
}

/// `GET /` — render the gallery from the controller's current state.
///
/// While a search is still being debounced, or a fetch or upload is running,
/// the page carries a reload hint so the browser picks up the settled state.
pub async fn index(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Html<String>, AppError> {
    let snapshot = state.controller.snapshot().await;
    let html = render_page(&snapshot, params.page.unwrap_or(1), state.page_size).map_err(|e| {
        error!("Failed to render gallery page: {}", e);
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page")
    })?;
    Ok(Html(html))
}

/// `POST /search` — one keystroke's worth of query input.
pub async fn search(State(state): State<AppState>, Form(form): Form<SearchForm>) -> Redirect {
    state.controller.input(form.query).await;
    Redirect::to("/")
}

/// `POST /upload` — file picked in the upload control.
pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> Redirect {
    match read_upload(multipart).await {
        Ok(file) => match state.controller.upload(file).await {
            Ok(record) => debug!(image_id = %record.image_id, "form upload stored"),
            Err(err) => debug!(error = %err, "form upload rejected"),
        },
        Err(AppError { message, .. }) => warn!(error = %message, "unreadable upload form"),
    }
    Redirect::to("/")
}

/// `POST /delete` — delete button on a card.
pub async fn delete(State(state): State<AppState>, Form(form): Form<DeleteForm>) -> Redirect {
    match state
        .controller
        .delete(&form.image_id, &form.document_id)
        .await
    {
        Ok(()) => debug!(image_id = %form.image_id, "form delete done"),
        Err(err) => debug!(image_id = %form.image_id, error = %err, "form delete failed"),
    }
    Redirect::to("/")
}

/// `GET /assets/placeholder.svg`
pub async fn placeholder() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/svg+xml")], PLACEHOLDER_SVG)
}
