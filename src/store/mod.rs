//! Object-store capability consumed by the browser service.
//!
//! A store is a flat key space. Folders only exist as a naming convention
//! (keys ending in the separator) and as prefix groups produced by
//! prefix/delimiter listing. Implementations:
//!
//! - [`azure::AzureBlobStore`] talks to one Azure Blob Storage container and can
//!   be built from a connection string, the default credential chain, or an
//!   explicit client secret.
//! - [`memory::MemoryStore`] keeps objects in process. Used for local runs and
//!   tests; it can inject faults.

pub mod azure;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, num::NonZeroU32, sync::Arc};
use thiserror::Error;

/// Streamed object payload.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// One server-side page of listing results per item, in store order.
pub type PageStream = BoxStream<'static, StoreResult<Vec<StoreEntry>>>;

/// Raw listing entry as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// True when the store collapsed several keys into one common prefix.
    pub is_prefix_group: bool,
    /// Full blob name, or the prefix (ending in the delimiter) for groups.
    pub key: String,
}

impl StoreEntry {
    pub fn blob(key: impl Into<String>) -> Self {
        Self {
            is_prefix_group: false,
            key: key.into(),
        }
    }

    pub fn prefix_group(key: impl Into<String>) -> Self {
        Self {
            is_prefix_group: true,
            key: key.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object `{0}` already exists")]
    AlreadyExists(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected credentials: {0}")]
    Auth(String),
    #[error("store client misconfigured: {0}")]
    Config(String),
    #[error("store request failed: {0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Capability interface over a flat, prefix-addressable object store.
///
/// Handles are long-lived and shared between requests, so implementations
/// must be thread-safe and must not keep per-call state.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Lists keys under `prefix`, `page_size` entries per server round trip.
    ///
    /// With a delimiter, keys sharing a prefix up to the next delimiter are
    /// collapsed into a single prefix group. Without one, every key under
    /// `prefix` is returned. The stream ends when the store reports no
    /// further pages.
    fn list(&self, prefix: &str, delimiter: Option<char>, page_size: NonZeroU32) -> PageStream;

    /// Opens a read stream over an object's content.
    async fn open_read(&self, key: &str) -> StoreResult<ByteStream>;

    /// Writes an object. With `overwrite == false` an existing key is left
    /// untouched and [`StoreError::AlreadyExists`] is returned.
    async fn put(&self, key: &str, data: Bytes, overwrite: bool) -> StoreResult<()>;

    /// Deletes a single object. A missing key yields [`StoreError::NotFound`].
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

/// How to reach the backing store. Produced from configuration at startup.
#[derive(Clone)]
pub enum StoreSettings {
    ConnectionString {
        connection_string: String,
        container: String,
    },
    DefaultCredential {
        account_url: String,
        container: String,
    },
    ClientSecret {
        account_url: String,
        container: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    Memory,
}

/// Build the single store handle shared by the whole process.
pub fn connect(settings: StoreSettings) -> StoreResult<Arc<dyn ObjectStoreClient>> {
    let store: Arc<dyn ObjectStoreClient> = match settings {
        StoreSettings::ConnectionString {
            connection_string,
            container,
        } => Arc::new(azure::AzureBlobStore::from_connection_string(
            &connection_string,
            &container,
        )?),
        StoreSettings::DefaultCredential {
            account_url,
            container,
        } => Arc::new(azure::AzureBlobStore::with_default_credential(
            &account_url,
            &container,
        )?),
        StoreSettings::ClientSecret {
            account_url,
            container,
            tenant_id,
            client_id,
            client_secret,
        } => Arc::new(azure::AzureBlobStore::with_client_secret(
            &account_url,
            &container,
            &tenant_id,
            &client_id,
            &client_secret,
        )?),
        StoreSettings::Memory => Arc::new(memory::MemoryStore::new()),
    };

    tracing::info!("Connected object store: {}", store.describe());
    Ok(store)
}
