//! In-process object store.
//!
//! Mirrors blob-storage listing semantics (lexicographic order, prefix
//! groups interleaved with blobs, server-side page size) so the browser
//! service behaves the same against it as against a real container.

use super::{ByteStream, ObjectStoreClient, PageStream, StoreEntry, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{
    collections::{BTreeMap, HashSet},
    io::Cursor,
    num::NonZeroU32,
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::RwLock;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Failure to inject into subsequent store calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Every call fails as if the network were down.
    Unreachable,
    /// Every call fails as if credentials were rejected.
    Unauthorized,
    /// Listing serves `pages` good pages, then fails.
    UnreachableAfterPages(usize),
}

impl StoreFault {
    fn error(self) -> StoreError {
        match self {
            StoreFault::Unreachable | StoreFault::UnreachableAfterPages(_) => {
                StoreError::Unavailable("connection refused".into())
            }
            StoreFault::Unauthorized => {
                StoreError::Auth("server failed to authenticate the request".into())
            }
        }
    }
}

#[derive(Default)]
struct Faults {
    store: Option<StoreFault>,
    keys: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    faults: Arc<RwLock<Faults>>,
    pages_served: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with objects.
    pub fn with_objects<I, K, V>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let map = objects
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            objects: Arc::new(RwLock::new(map)),
            ..Self::default()
        }
    }

    /// Make every subsequent call fail with `fault` until cleared.
    pub async fn fail_with(&self, fault: StoreFault) {
        self.faults.write().await.store = Some(fault);
    }

    /// Make reads, writes, and deletes of `key` fail as unreachable.
    pub async fn fail_key(&self, key: impl Into<String>) {
        self.faults.write().await.keys.insert(key.into());
    }

    pub async fn clear_faults(&self) {
        let mut faults = self.faults.write().await;
        faults.store = None;
        faults.keys.clear();
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Number of listing pages handed out so far.
    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }

    async fn check(&self, key: &str) -> StoreResult<()> {
        let faults = self.faults.read().await;
        match faults.store {
            None | Some(StoreFault::UnreachableAfterPages(_)) => {}
            Some(fault) => return Err(fault.error()),
        }
        if faults.keys.contains(key) {
            return Err(StoreError::Unavailable(format!("I/O error on `{key}`")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryStore {
    fn list(&self, prefix: &str, delimiter: Option<char>, page_size: NonZeroU32) -> PageStream {
        let objects = self.objects.clone();
        let faults = self.faults.clone();
        let pages_served = self.pages_served.clone();
        let prefix = prefix.to_string();
        let page_size = page_size.get() as usize;

        let pages = async move {
            let fault = faults.read().await.store;
            let entries = group_entries(&*objects.read().await, &prefix, delimiter);
            debug!(prefix, entries = entries.len(), "memory listing");

            let mut pages: Vec<StoreResult<Vec<StoreEntry>>> = entries
                .chunks(page_size)
                .map(|chunk| Ok(chunk.to_vec()))
                .collect();
            match fault {
                Some(StoreFault::UnreachableAfterPages(good)) => {
                    pages.truncate(good);
                    pages.push(Err(StoreFault::UnreachableAfterPages(good).error()));
                }
                Some(fault) => pages = vec![Err(fault.error())],
                None => {}
            }
            pages
        };

        stream::once(pages)
            .flat_map(stream::iter)
            .inspect(move |page| {
                if page.is_ok() {
                    pages_served.fetch_add(1, Ordering::SeqCst);
                }
            })
            .boxed()
    }

    async fn open_read(&self, key: &str) -> StoreResult<ByteStream> {
        self.check(key).await?;
        let data = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(ReaderStream::new(Cursor::new(data)).boxed())
    }

    async fn put(&self, key: &str, data: Bytes, overwrite: bool) -> StoreResult<()> {
        self.check(key).await?;
        let mut objects = self.objects.write().await;
        if !overwrite && objects.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        debug!(key, size = data.len(), "memory put");
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check(key).await?;
        match self.objects.write().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

/// Group keys the way blob storage does for a prefix/delimiter listing.
///
/// Keys sharing a prefix are contiguous in sorted order, so a group only has
/// to be compared against the previous one to be emitted once.
fn group_entries(
    objects: &BTreeMap<String, Bytes>,
    prefix: &str,
    delimiter: Option<char>,
) -> Vec<StoreEntry> {
    let mut entries: Vec<StoreEntry> = Vec::new();
    let range = objects.range::<str, _>((Bound::Included(prefix), Bound::Unbounded));

    for (key, _) in range {
        if !key.starts_with(prefix) {
            break;
        }
        let rest = &key[prefix.len()..];
        let group = delimiter.and_then(|d| rest.find(d).map(|pos| pos + d.len_utf8()));

        match group {
            Some(end) => {
                let group_key = &key[..prefix.len() + end];
                let seen = entries
                    .last()
                    .is_some_and(|last| last.is_prefix_group && last.key == group_key);
                if !seen {
                    entries.push(StoreEntry::prefix_group(group_key));
                }
            }
            None => entries.push(StoreEntry::blob(key.clone())),
        }
    }

    entries
}
