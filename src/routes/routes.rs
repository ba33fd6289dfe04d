//! Defines routes for the gallery page and its JSON API.
//!
//! ## Structure
//! - **Page**
//!   - `GET  /` — gallery page (`?page=`)
//!   - `POST /search`, `POST /upload`, `POST /delete` — form actions, redirect to `/`
//!   - `GET  /assets/placeholder.svg`
//!
//! - **API**
//!   - `GET    /api/state` — page controller snapshot
//!   - `POST   /api/query` — debounced search input
//!   - `GET    /api/pictures` — paginated search (`?q=&page=&perPage=`)
//!   - `POST   /api/pictures` — multipart upload
//!   - `GET    /api/pictures/count`
//!   - `DELETE /api/pictures/{document_id}?imageId=`
//!   - `GET    /api/blobs/{image_id}` — picture bytes
//!   - `POST   /api/reconcile` — orphaned blob sweep

use crate::{
    handlers::{
        gallery_handlers::{delete, index, placeholder, search, upload},
        health_handlers::{healthz, readyz},
        picture_handlers::{
            count_pictures, delete_picture, get_blob, get_state, list_pictures, post_query,
            reconcile, upload_picture,
        },
    },
    state::AppState,
    views::gallery_page::PLACEHOLDER_PATH,
};
use axum::{
    Router,
    routing::{delete as delete_route, get, post},
};

/// Build and return the router for the page, the API and the probes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Page
        .route("/", get(index))
        .route("/search", post(search))
        .route("/upload", post(upload))
        .route("/delete", post(delete))
        .route(PLACEHOLDER_PATH, get(placeholder))
        // API
        .route("/api/state", get(get_state))
        .route("/api/query", post(post_query))
        .route("/api/pictures", get(list_pictures).post(upload_picture))
        .route("/api/pictures/count", get(count_pictures))
        .route("/api/pictures/{document_id}", delete_route(delete_picture))
        .route("/api/blobs/{image_id}", get(get_blob))
        .route("/api/reconcile", post(reconcile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::memory::MemoryBackend,
        models::picture::PictureRecord,
        services::{
            gallery_service::GalleryService,
            page_controller::{DEFAULT_DEBOUNCE, PageController},
        },
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use std::sync::{Arc, atomic::Ordering};
    use tower::ServiceExt;

    const BOUNDARY: &str = "gallery-test-boundary";

    fn app() -> (Router, MemoryBackend) {
        let backend = MemoryBackend::new("/api/blobs");
        let service = GalleryService::new(Arc::new(backend.clone()), Arc::new(backend.clone()));
        let state = AppState {
            controller: PageController::new(service.clone(), DEFAULT_DEBOUNCE),
            service,
            page_size: 24,
            orphan_grace: chrono::Duration::minutes(5),
        };
        (routes().with_state(state), backend)
    }

    fn multipart_request(uri: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn html_body(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form_request(uri: &str, body: &'static str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_list_fetch_and_delete_over_http() {
        let (app, _) = app();

        let resp = app
            .clone()
            .oneshot(multipart_request("/api/pictures", "cat.png", b"\x89PNG"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let record: PictureRecord = serde_json::from_value(json_body(resp).await).unwrap();
        assert_eq!(record.image_name, "cat.png");

        let resp = app
            .clone()
            .oneshot(Request::get("/api/pictures?q=ca").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let page = json_body(resp).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["records"][0]["imageId"], record.image_id.as_str());

        let resp = app
            .clone()
            .oneshot(
                Request::get(format!("/api/blobs/{}", record.image_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        let last_modified = resp.headers()[header::LAST_MODIFIED].to_str().unwrap();
        assert!(last_modified.ends_with(" GMT"), "{last_modified}");
        assert!(!last_modified.contains("+0000"));
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"\x89PNG");

        let resp = app
            .clone()
            .oneshot(
                Request::delete(format!(
                    "/api/pictures/{}?imageId={}",
                    record.document_id, record.image_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app
            .oneshot(Request::get("/api/pictures/count").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(resp).await["total"], 0);
    }

    #[tokio::test]
    async fn duplicate_upload_is_a_conflict() {
        let (app, _) = app();
        let first = app
            .clone()
            .oneshot(multipart_request("/api/pictures", "cat.png", b"a"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .clone()
            .oneshot(multipart_request("/api/pictures", "cat.png", b"b"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let resp = app
            .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(resp).await["total"], 1);
    }

    #[tokio::test]
    async fn delete_without_image_id_is_unprocessable() {
        let (app, _) = app();
        let resp = app
            .oneshot(
                Request::delete("/api/pictures/doc1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn form_upload_redirects_and_page_renders_card() {
        let (app, _) = app();
        let resp = app
            .clone()
            .oneshot(multipart_request("/upload", "dog.png", b"d"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");

        let resp = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = html_body(resp).await;
        assert!(html.contains("dog.png"));
        assert!(html.contains("Pictures: 1"));
    }

    #[tokio::test]
    async fn readyz_reports_backend_failure() {
        let (app, backend) = app();
        let ok = app
            .clone()
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        backend.faults().document_list.store(true, Ordering::SeqCst);
        let down = app
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(down).await["checks"]["backend"]["ok"], false);
    }

    #[tokio::test]
    async fn reconcile_endpoint_returns_report() {
        let (app, _) = app();
        let resp = app
            .oneshot(Request::post("/api/reconcile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let report = json_body(resp).await;
        assert_eq!(report["scanned"], 0);
        assert_eq!(report["removed"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn search_form_shows_filtered_results_once_settled() {
        let (app, _) = app();
        for name in ["cat.png", "dog.png"] {
            let resp = app
                .clone()
                .oneshot(multipart_request("/upload", name, b"x"))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        }

        let resp = app
            .clone()
            .oneshot(form_request("/search", "query=cat"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");

        let html = html_body(
            app.clone()
                .oneshot(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert!(html.contains(r#"http-equiv="refresh""#));
        assert!(html.contains(r#"value="cat""#));

        tokio::time::sleep(DEFAULT_DEBOUNCE * 2).await;

        let html = html_body(
            app.oneshot(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert!(!html.contains(r#"http-equiv="refresh""#));
        assert!(html.contains("<h3>cat.png</h3>"));
        assert!(!html.contains("dog.png"));
    }

    #[tokio::test]
    async fn page_state_is_shared_by_every_client() {
        let (app, _) = app();
        let resp = app
            .clone()
            .oneshot(
                Request::post("/api/query")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"query":"cat"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        // A second browser with no prior requests sees the first one's input.
        let resp = app
            .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let state = json_body(resp).await;
        assert_eq!(state["query"], "cat");
        assert_eq!(state["pending"], true);
    }

    #[tokio::test]
    async fn failed_form_actions_still_redirect_home() {
        let (app, backend) = app();
        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(multipart_request("/upload", "cat.png", b"c"))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        }
        assert_eq!(backend.blob_creates(), 1);

        let resp = app
            .oneshot(form_request("/delete", "imageId=missing&documentId=missing"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers()[header::LOCATION], "/");
    }
}
