//! BlobService — browse, read, upload, and delete files in one container.
//!
//! The service owns a single long-lived store handle built at startup and is
//! cheap to clone into every request. It keeps no mutable state: each call is
//! an independent request/response against the store, and every store call
//! is bounded by the configured timeout. Failures are never retried here;
//! they surface to the caller unchanged.

use crate::{
    models::{
        listing::{ListingEntry, ListingPage},
        transfer::{DeleteOutcome, FolderDeleteReport, UploadFile, UploadReceipt},
    },
    services::{mime, paths},
    store::{ByteStream, ObjectStoreClient, StoreEntry, StoreError},
};
use bytes::Bytes;
use clap::ValueEnum;
use futures::{StreamExt, TryStreamExt, future, stream};
use std::{fmt, future::Future, num::NonZeroU32, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Listing entries requested per store round trip.
pub const DEFAULT_PAGE_SIZE: NonZeroU32 = NonZeroU32::new(10).unwrap();
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

const DELETE_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("`{0}` is not supported for viewing")]
    UnsupportedExtension(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("store rejected credentials: {0}")]
    StoreAuth(String),
    #[error("{0} is not available in the Lite version")]
    NotImplemented(&'static str),
    #[error("folder `{prefix}` only partially deleted: {deleted} removed, {} left", .failed.len())]
    FolderDeleteIncomplete {
        prefix: String,
        deleted: usize,
        failed: Vec<String>,
    },
    #[error("configuration error: {0}")]
    Config(String),
}

pub type BrowserResult<T> = Result<T, BrowserError>;

impl From<StoreError> for BrowserError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => BrowserError::NotFound(key),
            StoreError::AlreadyExists(key) => BrowserError::AlreadyExists(key),
            StoreError::Unavailable(msg) | StoreError::Other(msg) => {
                BrowserError::StoreUnavailable(msg)
            }
            StoreError::Auth(msg) => BrowserError::StoreAuth(msg),
            StoreError::Config(msg) => BrowserError::Config(msg),
        }
    }
}

/// Which operations are offered. `Lite` keeps browsing and downloads but
/// refuses every mutating operation with [`BrowserError::NotImplemented`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Edition {
    #[default]
    Full,
    Lite,
}

#[derive(Clone, Copy, Debug)]
pub struct ServiceOptions {
    pub page_size: NonZeroU32,
    pub store_timeout: Duration,
    pub edition: Edition,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            edition: Edition::Full,
        }
    }
}

/// An opened file, ready to stream to a client.
pub struct FileContent {
    pub key: String,
    /// Inline MIME type, when the extension has a viewer.
    pub mime: Option<&'static str>,
    pub body: ByteStream,
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileContent")
            .field("key", &self.key)
            .field("mime", &self.mime)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct BlobService {
    store: Arc<dyn ObjectStoreClient>,
    options: ServiceOptions,
}

impl BlobService {
    pub fn new(store: Arc<dyn ObjectStoreClient>, options: ServiceOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Direct children of `folder_path`, files and sub-folders, in store order.
    ///
    /// `folder_path` is `/`, `""`, or a key ending in the separator. Any other
    /// path is a caller error and yields an empty listing without touching the
    /// store. Pages are fetched until the store reports completion; a failure
    /// on any page fails the whole call.
    pub async fn list_children(&self, folder_path: &str) -> BrowserResult<ListingPage> {
        self.list_children_paged(folder_path, self.options.page_size)
            .await
    }

    pub async fn list_children_paged(
        &self,
        folder_path: &str,
        page_size: NonZeroU32,
    ) -> BrowserResult<ListingPage> {
        if !paths::is_root(folder_path) && !paths::is_folder(folder_path)? {
            warn!(folder_path, "listing requested for a non-folder path");
            return Ok(ListingPage::default());
        }
        let prefix = paths::folder_prefix(folder_path);

        let pages: Vec<Vec<StoreEntry>> = self
            .timed(
                "list",
                self.store
                    .list(prefix, Some(paths::SEPARATOR), page_size)
                    .try_collect(),
            )
            .await?;

        debug!(prefix, pages = pages.len(), "listing complete");

        Ok(pages
            .into_iter()
            .flatten()
            // The folder's own marker comes back as a blob under its prefix.
            .filter(|entry| entry.is_prefix_group || entry.key != prefix)
            .map(|entry| {
                if entry.is_prefix_group {
                    ListingEntry::folder(entry.key)
                } else {
                    ListingEntry::file(entry.key)
                }
            })
            .collect())
    }

    /// Cheap connectivity check: fetch one page of one entry from the root.
    pub async fn probe(&self) -> BrowserResult<()> {
        let mut pages = self
            .store
            .list("", Some(paths::SEPARATOR), NonZeroU32::MIN);
        self.timed("probe", async move { pages.next().await.transpose() })
            .await?;
        Ok(())
    }

    /// Open a file for streaming. Folder keys are rejected.
    pub async fn get_file(&self, key: &str) -> BrowserResult<FileContent> {
        if paths::is_folder(key)? {
            return Err(BrowserError::InvalidKey(format!("`{key}` is a folder")));
        }
        let body = self.timed("open", self.store.open_read(key)).await?;
        Ok(FileContent {
            key: key.to_string(),
            mime: mime::mime_for_key(key),
            body,
        })
    }

    /// Like [`get_file`](Self::get_file) but only for extensions with an inline
    /// viewer. The extension is checked before the store is contacted.
    pub async fn view_file(&self, key: &str) -> BrowserResult<FileContent> {
        if mime::mime_for_key(key).is_none() {
            // Without an extension the key itself is the best description.
            let what = paths::extension(key).unwrap_or(key);
            return Err(BrowserError::UnsupportedExtension(what.to_string()));
        }
        self.get_file(key).await
    }

    /// Upload one file into `folder`.
    ///
    /// Existing objects are kept and reported as [`BrowserError::AlreadyExists`]
    /// unless `overwrite` is set.
    pub async fn upload_file(
        &self,
        folder: &str,
        file_name: &str,
        data: Bytes,
        overwrite: bool,
    ) -> BrowserResult<UploadReceipt> {
        self.ensure_available("upload")?;
        let key = paths::join_key(folder, file_name)?;
        let size_bytes = data.len();

        self.timed("put", self.store.put(&key, data, overwrite))
            .await?;
        info!(key, size_bytes, overwrite, "uploaded file");

        Ok(UploadReceipt { key, size_bytes })
    }

    /// Upload a batch concurrently. All uploads are allowed to settle; the
    /// first failure (in request order) is returned if any failed.
    pub async fn upload_files(
        &self,
        folder: &str,
        files: Vec<UploadFile>,
        overwrite: bool,
    ) -> BrowserResult<Vec<UploadReceipt>> {
        self.ensure_available("upload")?;
        let uploads = files.into_iter().map(|file| async move {
            let UploadFile { file_name, data } = file;
            self.upload_file(folder, &file_name, data, overwrite).await
        });
        future::join_all(uploads).await.into_iter().collect()
    }

    /// Delete a file, or a whole folder when `key` is a folder marker.
    pub async fn delete_file(&self, key: &str) -> BrowserResult<DeleteOutcome> {
        self.ensure_available("delete")?;
        if paths::is_folder(key)? {
            return self.delete_folder(key).await.map(DeleteOutcome::Folder);
        }

        self.timed("delete", self.store.delete(key)).await?;
        info!(key, "deleted file");
        Ok(DeleteOutcome::File {
            key: key.to_string(),
        })
    }

    /// Delete a folder and everything beneath it.
    ///
    /// Objects are deleted one by one (there is no cross-object transaction).
    /// Objects already gone count as deleted, so an interrupted delete can be
    /// re-run. If any object fails, the marker is left in place and the
    /// remaining keys are reported in [`BrowserError::FolderDeleteIncomplete`].
    pub async fn delete_folder(&self, prefix: &str) -> BrowserResult<FolderDeleteReport> {
        self.ensure_available("folder delete")?;
        if paths::is_root(prefix) {
            return Err(BrowserError::InvalidKey(
                "refusing to delete the container root".into(),
            ));
        }
        if !paths::is_folder(prefix)? {
            return Err(BrowserError::InvalidKey(format!("`{prefix}` is not a folder")));
        }

        let pages: Vec<Vec<StoreEntry>> = self
            .timed(
                "list",
                self.store
                    .list(prefix, None, self.options.page_size)
                    .try_collect(),
            )
            .await?;
        let keys: Vec<String> = pages
            .into_iter()
            .flatten()
            .map(|entry| entry.key)
            .filter(|key| key != prefix)
            .collect();

        let results: Vec<(String, BrowserResult<bool>)> = stream::iter(keys)
            .map(|key| async move {
                let result = self.delete_if_present(&key).await;
                (key, result)
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .collect()
            .await;

        let mut report = FolderDeleteReport {
            prefix: prefix.to_string(),
            ..FolderDeleteReport::default()
        };
        let mut failed = Vec::new();
        for (key, result) in results {
            match result {
                Ok(true) => report.deleted += 1,
                Ok(false) => report.already_absent += 1,
                Err(err) => {
                    warn!(key, error = %err, "failed to delete object in folder");
                    failed.push(key);
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            return Err(BrowserError::FolderDeleteIncomplete {
                prefix: report.prefix,
                deleted: report.deleted,
                failed,
            });
        }

        match self.delete_if_present(prefix).await? {
            true => report.deleted += 1,
            false => report.already_absent += 1,
        }

        info!(
            prefix,
            deleted = report.deleted,
            already_absent = report.already_absent,
            "deleted folder"
        );
        Ok(report)
    }

    /// `Ok(false)` when the object was already gone.
    async fn delete_if_present(&self, key: &str) -> BrowserResult<bool> {
        match self.timed("delete", self.store.delete(key)).await {
            Ok(()) => Ok(true),
            Err(BrowserError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn ensure_available(&self, feature: &'static str) -> BrowserResult<()> {
        match self.options.edition {
            Edition::Full => Ok(()),
            Edition::Lite => Err(BrowserError::NotImplemented(feature)),
        }
    }

    async fn timed<T, F>(&self, operation: &str, call: F) -> BrowserResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.options.store_timeout, call).await {
            Ok(result) => result.map_err(BrowserError::from),
            Err(_) => Err(BrowserError::StoreUnavailable(format!(
                "{operation} timed out after {:?}",
                self.options.store_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreFault};

    fn sample_store() -> MemoryStore {
        MemoryStore::with_objects([
            ("a/", ""),
            ("a/x.txt", "x"),
            ("a/b/", ""),
            ("a/b/y.png", "y"),
            ("c.txt", "c"),
        ])
    }

    fn service_with(store: &MemoryStore, options: ServiceOptions) -> BlobService {
        BlobService::new(Arc::new(store.clone()), options)
    }

    fn service(store: &MemoryStore) -> BlobService {
        service_with(store, ServiceOptions::default())
    }

    fn lite(store: &MemoryStore) -> BlobService {
        service_with(
            store,
            ServiceOptions {
                edition: Edition::Lite,
                ..ServiceOptions::default()
            },
        )
    }

    async fn read_all(content: FileContent) -> Vec<u8> {
        let chunks: Vec<Bytes> = content.body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn lists_direct_children_only() {
        let store = sample_store();
        let page = service(&store).list_children("a/").await.unwrap();
        assert_eq!(
            page.entries,
            vec![ListingEntry::folder("a/b/"), ListingEntry::file("a/x.txt")]
        );
    }

    #[tokio::test]
    async fn lists_root_with_either_sentinel() {
        let store = sample_store();
        let svc = service(&store);
        let expected = vec![ListingEntry::folder("a/"), ListingEntry::file("c.txt")];
        assert_eq!(svc.list_children("/").await.unwrap().entries, expected);
        assert_eq!(svc.list_children("").await.unwrap().entries, expected);
    }

    #[tokio::test]
    async fn nested_folder_lists_its_own_children() {
        let store = sample_store();
        let page = service(&store).list_children("a/b/").await.unwrap();
        assert_eq!(page.entries, vec![ListingEntry::file("a/b/y.png")]);
    }

    #[tokio::test]
    async fn non_folder_path_yields_empty_listing() {
        let store = sample_store();
        let page = service(&store).list_children("a/x.txt").await.unwrap();
        assert!(page.is_empty());
        assert_eq!(store.pages_served(), 0);
    }

    #[tokio::test]
    async fn pagination_is_transparent() {
        let store = MemoryStore::with_objects((0..25).map(|i| {
            let key = if i % 4 == 0 {
                format!("dir/sub{i:02}/inner.txt")
            } else {
                format!("dir/file{i:02}.txt")
            };
            (key, "x")
        }));
        let svc = service(&store);

        let paged = svc.list_children("dir/").await.unwrap();
        assert_eq!(store.pages_served(), 3);

        let unpaged = svc
            .list_children_paged("dir/", NonZeroU32::new(1000).unwrap())
            .await
            .unwrap();
        assert_eq!(paged, unpaged);
        assert_eq!(paged.len(), 25);
    }

    #[tokio::test]
    async fn unreachable_store_is_store_unavailable() {
        let store = sample_store();
        store.fail_with(StoreFault::Unreachable).await;
        let err = service(&store).list_children("/").await.unwrap_err();
        assert!(matches!(err, BrowserError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn mid_listing_failure_returns_no_partial_results() {
        let store = MemoryStore::with_objects((0..25).map(|i| (format!("f{i:02}.txt"), "x")));
        store.fail_with(StoreFault::UnreachableAfterPages(2)).await;
        let err = service(&store).list_children("/").await.unwrap_err();
        assert!(matches!(err, BrowserError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn rejected_credentials_are_store_auth() {
        let store = sample_store();
        store.fail_with(StoreFault::Unauthorized).await;
        let err = service(&store).list_children("a/").await.unwrap_err();
        assert!(matches!(err, BrowserError::StoreAuth(_)));
    }

    #[tokio::test]
    async fn reads_file_content_with_mime() {
        let store = sample_store();
        let content = service(&store).get_file("a/b/y.png").await.unwrap();
        assert_eq!(content.mime, Some("image/png"));
        assert_eq!(read_all(content).await, b"y".to_vec());
    }

    #[tokio::test]
    async fn reading_a_folder_is_invalid() {
        let store = sample_store();
        let err = service(&store).get_file("a/").await.unwrap_err();
        assert!(matches!(err, BrowserError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn view_requires_known_extension() {
        let store = MemoryStore::with_objects([("doc.docx", "d")]);
        let err = service(&store).view_file("doc.docx").await.unwrap_err();
        assert!(matches!(&err, BrowserError::UnsupportedExtension(ext) if ext == ".docx"));
        assert_eq!(err.to_string(), "`.docx` is not supported for viewing");
    }

    #[tokio::test]
    async fn view_without_extension_names_the_key() {
        let store = MemoryStore::with_objects([("a/README", "r")]);
        let err = service(&store).view_file("a/README").await.unwrap_err();
        assert!(matches!(&err, BrowserError::UnsupportedExtension(what) if what == "a/README"));
        assert_eq!(err.to_string(), "`a/README` is not supported for viewing");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let store = sample_store();
        let err = service(&store).get_file("a/missing.txt").await.unwrap_err();
        assert!(matches!(err, BrowserError::NotFound(_)));
    }

    #[tokio::test]
    async fn upload_rejects_existing_unless_overwrite() {
        let store = sample_store();
        let svc = service(&store);

        let err = svc
            .upload_file("a/", "x.txt", Bytes::from_static(b"new"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::AlreadyExists(key) if key == "a/x.txt"));
        assert_eq!(store.get("a/x.txt").await.unwrap(), Bytes::from_static(b"x"));

        let receipt = svc
            .upload_file("a/", "x.txt", Bytes::from_static(b"new"), true)
            .await
            .unwrap();
        assert_eq!(receipt.key, "a/x.txt");
        assert_eq!(receipt.size_bytes, 3);
        assert_eq!(store.get("a/x.txt").await.unwrap(), Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn batch_upload_writes_every_file() {
        let store = MemoryStore::new();
        let files = ["one.txt", "two.txt", "three.txt"]
            .into_iter()
            .map(|name| UploadFile {
                file_name: name.to_string(),
                data: Bytes::from(name.to_string()),
            })
            .collect();

        let receipts = service(&store)
            .upload_files("docs", files, false)
            .await
            .unwrap();
        let keys: Vec<_> = receipts.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["docs/one.txt", "docs/two.txt", "docs/three.txt"]);
        assert!(store.contains("docs/three.txt").await);
    }

    #[tokio::test]
    async fn batch_upload_reports_failure_after_others_settle() {
        let store = MemoryStore::with_objects([("docs/two.txt", "old")]);
        let files = ["one.txt", "two.txt", "three.txt"]
            .into_iter()
            .map(|name| UploadFile {
                file_name: name.to_string(),
                data: Bytes::from_static(b"new"),
            })
            .collect();

        let err = service(&store)
            .upload_files("docs/", files, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::AlreadyExists(_)));
        assert!(store.contains("docs/one.txt").await);
        assert!(store.contains("docs/three.txt").await);
    }

    #[tokio::test]
    async fn deletes_single_file() {
        let store = sample_store();
        let outcome = service(&store).delete_file("c.txt").await.unwrap();
        assert_eq!(
            outcome,
            DeleteOutcome::File {
                key: "c.txt".into()
            }
        );
        assert!(!store.contains("c.txt").await);

        let err = service(&store).delete_file("c.txt").await.unwrap_err();
        assert!(matches!(err, BrowserError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_folder_key_removes_everything_beneath() {
        let store = sample_store();
        let outcome = service(&store).delete_file("a/").await.unwrap();
        match outcome {
            DeleteOutcome::Folder(report) => {
                assert_eq!(report.prefix, "a/");
                assert_eq!(report.deleted, 4);
                assert_eq!(report.already_absent, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.keys().await, vec!["c.txt".to_string()]);
    }

    #[tokio::test]
    async fn folder_delete_is_idempotent() {
        let store = sample_store();
        let svc = service(&store);
        svc.delete_folder("a/b/").await.unwrap();

        let report = svc.delete_folder("a/b/").await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.already_absent, 1);
        assert!(store.contains("a/x.txt").await);
    }

    #[tokio::test]
    async fn folder_delete_tolerates_partial_failure() {
        let store = sample_store();
        store.fail_key("a/x.txt").await;
        let svc = service(&store);

        let err = svc.delete_folder("a/").await.unwrap_err();
        match err {
            BrowserError::FolderDeleteIncomplete {
                prefix,
                deleted,
                failed,
            } => {
                assert_eq!(prefix, "a/");
                assert_eq!(deleted, 2);
                assert_eq!(failed, vec!["a/x.txt".to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Marker stays so the folder remains visible with what is left.
        assert!(store.contains("a/").await);
        assert!(store.contains("a/x.txt").await);

        store.clear_faults().await;
        let report = svc.delete_folder("a/").await.unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(store.keys().await, vec!["c.txt".to_string()]);
    }

    #[tokio::test]
    async fn folder_delete_rejects_root_and_files() {
        let store = sample_store();
        let svc = service(&store);
        assert!(matches!(
            svc.delete_folder("/").await,
            Err(BrowserError::InvalidKey(_))
        ));
        assert!(matches!(
            svc.delete_folder("c.txt").await,
            Err(BrowserError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn lite_edition_refuses_mutations() {
        let store = sample_store();
        let svc = lite(&store);

        assert!(matches!(
            svc.upload_file("/", "n.txt", Bytes::new(), false).await,
            Err(BrowserError::NotImplemented(_))
        ));
        assert!(matches!(
            svc.delete_file("c.txt").await,
            Err(BrowserError::NotImplemented(_))
        ));
        assert!(matches!(
            svc.delete_folder("a/").await,
            Err(BrowserError::NotImplemented(_))
        ));
        assert_eq!(store.keys().await.len(), 5);

        // Reads are unaffected.
        assert_eq!(svc.list_children("/").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn slow_store_times_out_as_unavailable() {
        struct Stalled;

        #[async_trait::async_trait]
        impl ObjectStoreClient for Stalled {
            fn list(
                &self,
                _prefix: &str,
                _delimiter: Option<char>,
                _page_size: NonZeroU32,
            ) -> crate::store::PageStream {
                stream::pending().boxed()
            }

            async fn open_read(&self, _key: &str) -> crate::store::StoreResult<ByteStream> {
                future::pending().await
            }

            async fn put(
                &self,
                _key: &str,
                _data: Bytes,
                _overwrite: bool,
            ) -> crate::store::StoreResult<()> {
                future::pending().await
            }

            async fn delete(&self, _key: &str) -> crate::store::StoreResult<()> {
                future::pending().await
            }

            fn describe(&self) -> String {
                "stalled".into()
            }
        }

        let svc = BlobService::new(
            Arc::new(Stalled),
            ServiceOptions {
                store_timeout: Duration::from_millis(20),
                ..ServiceOptions::default()
            },
        );
        assert!(matches!(
            svc.list_children("/").await,
            Err(BrowserError::StoreUnavailable(_))
        ));
        assert!(matches!(
            svc.get_file("c.txt").await,
            Err(BrowserError::StoreUnavailable(_))
        ));
    }
}
