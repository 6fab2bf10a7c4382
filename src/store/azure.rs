//! Azure Blob Storage backend.
//!
//! One container per handle. The three constructors only differ in how
//! credentials are obtained; listing, reads, and writes go through the same
//! `ContainerClient` regardless.

use super::{ByteStream, ObjectStoreClient, PageStream, StoreEntry, StoreError, StoreResult};
use async_trait::async_trait;
use azure_core::{
    Url,
    auth::TokenCredential,
    error::ErrorKind,
    request_options::{IfMatchCondition, MaxResults},
};
use azure_identity::{ClientSecretCredential, DefaultAzureCredentialBuilder};
use azure_storage::{CloudLocation, ConnectionString, StorageCredentials};
use azure_storage_blobs::{
    container::operations::BlobItem,
    prelude::{ClientBuilder, ContainerClient},
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use std::{io, num::NonZeroU32, sync::Arc};
use tracing::debug;

const AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";
const PUBLIC_BLOB_SUFFIX: &str = ".blob.core.windows.net";

#[derive(Clone)]
pub struct AzureBlobStore {
    container: ContainerClient,
    label: String,
}

impl AzureBlobStore {
    /// Authenticate with a shared-key connection string from the portal.
    pub fn from_connection_string(connection_string: &str, container: &str) -> StoreResult<Self> {
        let parsed = ConnectionString::new(connection_string).map_err(config_error)?;
        let account = parsed
            .account_name
            .ok_or_else(|| StoreError::Config("connection string has no AccountName".into()))?
            .to_string();
        let credentials = parsed.storage_credentials().map_err(config_error)?;

        let builder = match parsed.blob_endpoint {
            Some(endpoint) => ClientBuilder::with_location(
                CloudLocation::Custom {
                    account: account.clone(),
                    uri: endpoint.trim_end_matches('/').to_string(),
                },
                credentials,
            ),
            None => ClientBuilder::new(account.clone(), credentials),
        };

        Ok(Self {
            container: builder.container_client(container),
            label: format!("azure://{account}/{container} (connection string)"),
        })
    }

    /// Authenticate through the default credential chain (environment,
    /// workload identity, managed identity, Azure CLI).
    pub fn with_default_credential(account_url: &str, container: &str) -> StoreResult<Self> {
        let credential = DefaultAzureCredentialBuilder::new()
            .build()
            .map_err(config_error)?;
        Self::with_token_credential(
            account_url,
            container,
            Arc::new(credential),
            "default credential",
        )
    }

    /// Authenticate as an app registration with an explicit client secret.
    pub fn with_client_secret(
        account_url: &str,
        container: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> StoreResult<Self> {
        let authority_host = Url::parse(AUTHORITY_HOST).map_err(config_error)?;
        let credential = ClientSecretCredential::new(
            azure_core::new_http_client(),
            authority_host,
            tenant_id.to_string(),
            client_id.to_string(),
            client_secret.to_string(),
        );
        Self::with_token_credential(
            account_url,
            container,
            Arc::new(credential),
            "client secret",
        )
    }

    fn with_token_credential(
        account_url: &str,
        container: &str,
        credential: Arc<dyn TokenCredential>,
        mode: &str,
    ) -> StoreResult<Self> {
        let (location, account) = location_from_account_url(account_url)?;
        let credentials = StorageCredentials::token_credential(credential);

        Ok(Self {
            container: ClientBuilder::with_location(location, credentials)
                .container_client(container),
            label: format!("azure://{account}/{container} ({mode})"),
        })
    }
}

#[async_trait]
impl ObjectStoreClient for AzureBlobStore {
    fn list(&self, prefix: &str, delimiter: Option<char>, page_size: NonZeroU32) -> PageStream {
        debug!(prefix, ?delimiter, page_size = page_size.get(), "listing blobs");

        let mut request = self
            .container
            .list_blobs()
            .prefix(prefix.to_string())
            .max_results(MaxResults::new(page_size));
        if let Some(delimiter) = delimiter {
            request = request.delimiter(delimiter.to_string());
        }

        let prefix = prefix.to_string();
        request
            .into_stream()
            .map(move |page| {
                let page = page.map_err(|err| classify(err, Operation::List, &prefix))?;
                Ok(page
                    .blobs
                    .items
                    .into_iter()
                    .map(|item| match item {
                        BlobItem::Blob(blob) => StoreEntry::blob(blob.name),
                        BlobItem::BlobPrefix(group) => StoreEntry::prefix_group(group.name),
                    })
                    .collect())
            })
            .boxed()
    }

    async fn open_read(&self, key: &str) -> StoreResult<ByteStream> {
        debug!(key, "opening blob for read");
        let mut chunks = self.container.blob_client(key).get().into_stream();

        // Pull the first chunk here so a missing blob or a rejected credential
        // surfaces before any bytes are handed to the caller.
        let first = match chunks.next().await.transpose() {
            Ok(first) => first,
            // The first request always asks for a range starting at 0, which a
            // zero-length blob cannot satisfy.
            Err(err) if is_unsatisfiable_range(&err) => {
                debug!(key, "blob is empty");
                return Ok(stream::empty::<io::Result<Bytes>>().boxed());
            }
            Err(err) => return Err(classify(err, Operation::Read, key)),
        };

        let body = stream::iter(first.map(|response| Ok(response.data)))
            .chain(chunks.map_ok(|response| response.data))
            .try_flatten()
            .map_err(io::Error::other);

        Ok(body.boxed())
    }

    async fn put(&self, key: &str, data: Bytes, overwrite: bool) -> StoreResult<()> {
        debug!(key, size = data.len(), overwrite, "uploading block blob");
        let mut request = self.container.blob_client(key).put_block_blob(data);
        if !overwrite {
            request = request.if_match(IfMatchCondition::NotMatch("*".to_string()));
        }
        request
            .await
            .map_err(|err| classify(err, Operation::Put { overwrite }, key))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        debug!(key, "deleting blob");
        self.container
            .blob_client(key)
            .delete()
            .await
            .map_err(|err| classify(err, Operation::Delete, key))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Derive the cloud location from `https://ACCOUNT.blob.core.windows.net`
/// style URLs. Any other host (Azurite, sovereign clouds, private
/// endpoints) is used verbatim as a custom endpoint.
fn location_from_account_url(account_url: &str) -> StoreResult<(CloudLocation, String)> {
    let url = Url::parse(account_url).map_err(config_error)?;
    let host = url
        .host_str()
        .ok_or_else(|| StoreError::Config(format!("account URL `{account_url}` has no host")))?;

    if let Some(account) = host.strip_suffix(PUBLIC_BLOB_SUFFIX) {
        let account = account.to_string();
        return Ok((
            CloudLocation::Public {
                account: account.clone(),
            },
            account,
        ));
    }

    // Emulator-style URLs carry the account as the first path segment.
    let account = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|segment| !segment.is_empty())
        .or_else(|| host.split('.').next())
        .unwrap_or(host)
        .to_string();

    Ok((
        CloudLocation::Custom {
            account: account.clone(),
            uri: account_url.trim_end_matches('/').to_string(),
        },
        account,
    ))
}

fn config_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Config(err.to_string())
}

/// Store call an SDK error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    List,
    Read,
    Put { overwrite: bool },
    Delete,
}

/// Map SDK failures onto the store taxonomy.
fn classify(err: azure_core::Error, operation: Operation, key: &str) -> StoreError {
    match err.kind() {
        ErrorKind::HttpResponse { status, error_code } => classify_status(
            u16::from(*status),
            error_code.as_deref(),
            operation,
            key,
            err.to_string(),
        ),
        ErrorKind::Credential => StoreError::Auth(err.to_string()),
        ErrorKind::Io => StoreError::Unavailable(err.to_string()),
        _ => StoreError::Other(err.to_string()),
    }
}

fn classify_status(
    status: u16,
    error_code: Option<&str>,
    operation: Operation,
    key: &str,
    message: String,
) -> StoreError {
    match (status, error_code) {
        (401 | 403, _) | (_, Some("AuthenticationFailed" | "AuthorizationFailure")) => {
            StoreError::Auth(message)
        }
        (404, Some("ContainerNotFound")) => {
            StoreError::Config(format!("container does not exist: {message}"))
        }
        // A listing names no object, so a 404 can only mean the container.
        (404, _) if operation == Operation::List => {
            StoreError::Config(format!("container does not exist: {message}"))
        }
        (404, _) => StoreError::NotFound(key.to_string()),
        // Only the conditional write can conflict on existence. Other 409/412
        // answers (leases, snapshots) are plain failures.
        (409 | 412, _) if matches!(operation, Operation::Put { overwrite: false }) => {
            StoreError::AlreadyExists(key.to_string())
        }
        (408 | 429 | 500..=599, _) => StoreError::Unavailable(message),
        _ => StoreError::Other(message),
    }
}

fn is_unsatisfiable_range(err: &azure_core::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::HttpResponse { status, .. } if u16::from(*status) == 416
    )
}
