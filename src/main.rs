use anyhow::Result;
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod views;

use backend::{
    BlobStore, DocumentStore,
    appwrite::{AppwriteBlobStore, AppwriteClient, AppwriteDocumentStore},
    memory::MemoryBackend,
};
use config::{AppConfig, BackendKind};
use services::{gallery_service::GalleryService, page_controller::PageController};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!(
        backend = ?cfg.backend,
        endpoint = %cfg.endpoint,
        project_id = %cfg.project_id,
        bucket_id = %cfg.bucket_id,
        database_id = %cfg.database_id,
        collection_id = %cfg.collection_id,
        "Starting picture-gallery"
    );
    let missing = cfg.missing_backend_settings();
    if !missing.is_empty() {
        tracing::warn!(
            "Backend settings not provided: {}. Backend calls will fail.",
            missing.join(", ")
        );
    }

    // --- Initialize backend stores ---
    let (blobs, documents) = build_stores(&cfg);

    // --- Initialize core services ---
    let service = GalleryService::new(blobs, documents);
    let controller = PageController::new(service.clone(), cfg.debounce);
    controller.init().await;

    let state = AppState {
        service,
        controller,
        page_size: cfg.page_size,
        orphan_grace: cfg.orphan_grace,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Pick the blob and document stores named by the configuration.
fn build_stores(cfg: &AppConfig) -> (Arc<dyn BlobStore>, Arc<dyn DocumentStore>) {
    match cfg.backend {
        BackendKind::Appwrite => {
            let client = AppwriteClient::new(&cfg.endpoint, &cfg.project_id, cfg.api_key.clone());
            (
                Arc::new(AppwriteBlobStore::new(client.clone(), &cfg.bucket_id)),
                Arc::new(AppwriteDocumentStore::new(
                    client,
                    &cfg.database_id,
                    &cfg.collection_id,
                )),
            )
        }
        BackendKind::Memory => {
            tracing::info!("Using in-memory stores; pictures are lost on exit");
            // Relative URLs resolve against whatever address serves the page.
            let memory = MemoryBackend::new("/api/blobs");
            (Arc::new(memory.clone()), Arc::new(memory))
        }
    }
}
