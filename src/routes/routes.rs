//! Defines routes for browsing and managing files in the container.
//!
//! ## Structure
//! - **Folder-level endpoints**
//!   - `GET    /files?folder=`      — list the direct children of a folder
//!   - `POST   /upload`             — upload one or more files (multipart)
//!
//! - **Entry-level endpoints**
//!   - `GET    /view/{*path}`       — render a file inline, or list a folder
//!   - `GET    /download/{*path}`   — download a file as an attachment
//!   - `DELETE /files/{*path}`      — delete a file, or a folder recursively
//!
//! The wildcard `*path` allows nested keys like `photos/2025/img.jpg`, and
//! folder keys keep their trailing `/`. Actions live outside `/files/` so
//! that every key under it, `view/x.txt` or `upload` included, reaches the
//! delete handler.

use crate::{
    handlers::{
        file_handlers::{delete_entry, download_file, list_files, upload_files, view_file},
        health_handlers::{healthz, readyz},
    },
    services::blob_service::BlobService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Build and return the router for all browser routes.
///
/// The router carries shared state (`BlobService`) to all handlers. Upload
/// requests may be up to `upload_limit_bytes`; everything else keeps axum's
/// default body limit.
pub fn routes(upload_limit_bytes: usize) -> Router<BlobService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Folder-level routes
        .route("/files", get(list_files))
        .route(
            "/upload",
            post(upload_files).layer(DefaultBodyLimit::max(upload_limit_bytes)),
        )
        // Entry-level routes
        .route("/view/{*path}", get(view_file))
        .route("/download/{*path}", get(download_file))
        .route("/files/{*path}", delete(delete_entry))
}
