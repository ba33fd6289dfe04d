//! JSON API over the gallery.
//!
//! Unlike the form endpoints these report failures: the typed facade errors
//! are mapped to status codes by `AppError`.

use crate::{
    errors::AppError,
    handlers::read_upload,
    models::blob::StoredBlob,
    services::{
        gallery_service::{ReconcileReport, SearchPage},
        page_controller::PageSnapshot,
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Query params accepted by `GET /api/pictures`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPicturesQuery {
    pub q: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct QueryInput {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePictureQuery {
    pub image_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub total: u64,
}

/// `GET /api/state` — the page controller's current state.
pub async fn get_state(State(state): State<AppState>) -> Json<PageSnapshot> {
    Json(state.controller.snapshot().await)
}

/// `POST /api/query` — feed a keystroke into the debounced search.
pub async fn post_query(
    State(state): State<AppState>,
    Json(input): Json<QueryInput>,
) -> impl IntoResponse {
    state.controller.input(input.query).await;
    (StatusCode::ACCEPTED, Json(state.controller.snapshot().await))
}

/// `GET /api/pictures` — paginated prefix search, bypassing the controller.
pub async fn list_pictures(
    State(state): State<AppState>,
    Query(q): Query<ListPicturesQuery>,
) -> Result<Json<SearchPage>, AppError> {
    let page = state
        .service
        .search_page(
            q.q.as_deref().unwrap_or(""),
            q.page.unwrap_or(1),
            q.per_page.unwrap_or(state.page_size),
        )
        .await?;
    Ok(Json(page))
}

/// `GET /api/pictures/count`
pub async fn count_pictures(
    State(state): State<AppState>,
) -> Result<Json<CountResponse>, AppError> {
    let total = state.service.count().await?;
    Ok(Json(CountResponse { total }))
}

/// `POST /api/pictures` — multipart upload through the controller.
pub async fn upload_picture(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let file = read_upload(multipart).await?;
    let record = state.controller.upload(file).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `DELETE /api/pictures/{document_id}?imageId=`
pub async fn delete_picture(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(q): Query<DeletePictureQuery>,
) -> Result<StatusCode, AppError> {
    state
        .controller
        .delete(q.image_id.as_deref().unwrap_or(""), &document_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/blobs/{image_id}` — stream a stored picture back to the browser.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Response, AppError> {
    let (meta, bytes) = state.service.download(&image_id).await?;
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    set_blob_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `POST /api/reconcile` — sweep blobs no record references.
pub async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileReport>, AppError> {
    let report = state.service.reconcile(state.orphan_grace).await?;
    Ok(Json(report))
}

fn set_blob_headers(headers: &mut HeaderMap, meta: &StoredBlob) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    let last_modified = meta
        .created_at
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let disposition = format!("inline; filename=\"{}\"", meta.name.replace('"', ""));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}
