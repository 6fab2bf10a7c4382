//! Browse, view, download, upload, and delete files in a blob storage
//! container through a small JSON/HTTP service.
//!
//! Folders are virtual: a key ending in `/` is a folder marker, and folder
//! listings are prefix/delimiter queries against the store.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
