//! Access to the remote document that holds every link.
//!
//! The backend only knows how to create, fetch and replace one whole
//! document. `LinkStore` layers per-slug operations on top of that with a
//! read-modify-write cycle, and keeps a short-lived cache of individual links.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;

use crate::{
    cache::{CacheStats, TtlCache},
    error::StoreError,
    models::{Link, LinkTable, NewLink, StoreStats},
};

mod gist;
mod memory;

pub use gist::GistBackend;
pub use memory::MemoryBackend;

/// TTL of the cache kept inside the store.
pub const STORE_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

/// A place that can hold the link table as one document.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Create a new document and return its id.
    async fn create_document(&self, initial: &LinkTable) -> Result<String, StoreError>;

    async fn document_exists(&self, id: &str) -> Result<(), StoreError>;

    async fn fetch(&self, id: &str) -> Result<LinkTable, StoreError>;

    /// Overwrite the document with `table`.
    async fn replace(&self, id: &str, table: &LinkTable) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted { deleted_slug: String, link: Link },
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCacheStats {
    #[serde(flatten)]
    pub cache: CacheStats,
    pub last_clear: DateTime<Utc>,
}

pub struct LinkStore {
    backend: Arc<dyn DocumentBackend>,
    document_id: String,
    cache: TtlCache<Link>,
    /// Serializes read-modify-write cycles issued by this process. Writers in
    /// other processes can still interleave; the last write wins.
    write_lock: Mutex<()>,
    last_clear_ms: AtomicI64,
}

impl LinkStore {
    /// Attach to the configured document, or create one.
    ///
    /// A configured id that cannot be fetched is replaced by a freshly
    /// created document, once. If that creation fails the error is returned
    /// and the server should not start.
    pub async fn initialize(
        backend: Arc<dyn DocumentBackend>,
        configured_id: Option<String>,
    ) -> Result<Self, StoreError> {
        let document_id = match configured_id {
            Some(id) => match backend.document_exists(&id).await {
                Ok(()) => {
                    tracing::info!("Using existing gist {}", id);
                    id
                }
                Err(e) => {
                    tracing::warn!("Gist {} not usable ({}), creating a new one", id, e);
                    create_document(backend.as_ref()).await?
                }
            },
            None => create_document(backend.as_ref()).await?,
        };

        Ok(Self {
            backend,
            document_id,
            cache: TtlCache::new(STORE_CACHE_TTL),
            write_lock: Mutex::new(()),
            last_clear_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    // ── Whole-document access ──────────────────────────────────────────────

    /// Fetch and parse the remote document.
    pub async fn read_all(&self) -> Result<LinkTable, StoreError> {
        self.backend.fetch(&self.document_id).await
    }

    /// `read_all` for read paths: a failure is logged and treated as an
    /// empty table so the page or lookup can still be served.
    async fn read_all_or_empty(&self) -> LinkTable {
        self.read_all().await.unwrap_or_else(|e| {
            tracing::warn!("Reading link table failed, treating it as empty: {}", e);
            LinkTable::empty()
        })
    }

    /// Overwrite the remote document.
    pub async fn write_all(&self, table: &mut LinkTable) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(table).await
    }

    /// Caller must hold `write_lock`.
    async fn write_locked(&self, table: &mut LinkTable) -> Result<(), StoreError> {
        table.stamp(Utc::now());
        self.backend.replace(&self.document_id, table).await
    }

    // ── Per-link operations ────────────────────────────────────────────────

    /// Look up one link, from the cache when fresh. Misses are not cached.
    pub async fn get_link(&self, slug: &str) -> Option<Link> {
        if let Some(link) = self.cache.get(slug) {
            return Some(link);
        }

        let mut table = self.read_all_or_empty().await;
        let link = table.links.remove(slug)?;
        self.cache.set(slug, link.clone());
        Some(link)
    }

    /// Insert a link and write the document back.
    ///
    /// The existing table must be readable; a failed read is returned rather
    /// than overwriting the document with nothing but the new link.
    pub async fn create_link(&self, new_link: NewLink) -> Result<Link, StoreError> {
        self.create_link_and(new_link, |_| {}).await
    }

    /// `create_link`, running `on_commit` with the written record before the
    /// write lock is released. Callers mirror the record into their own
    /// caches here so a concurrent delete cannot be overtaken.
    pub async fn create_link_and<F>(&self, new_link: NewLink, on_commit: F) -> Result<Link, StoreError>
    where
        F: FnOnce(&Link),
    {
        let _guard = self.write_lock.lock().await;

        let mut table = self.read_all().await?;
        let link = new_link.into_link(Utc::now());
        table.links.insert(link.slug.clone(), link.clone());
        self.write_locked(&mut table).await?;

        self.cache.set(&link.slug, link.clone());
        on_commit(&link);
        tracing::info!("Created link '{}' -> {}", link.slug, link.original_url);
        Ok(link)
    }

    pub async fn delete_link(&self, slug: &str) -> Result<DeleteOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut table = self.read_all().await?;
        let Some(link) = table.links.remove(slug) else {
            self.cache.delete(slug);
            return Ok(DeleteOutcome::NotFound);
        };
        self.write_locked(&mut table).await?;

        self.cache.delete(slug);
        tracing::info!("Deleted link '{}'", slug);
        Ok(DeleteOutcome::Deleted {
            deleted_slug: slug.to_owned(),
            link,
        })
    }

    /// Add one click and stamp `lastAccessed`.
    ///
    /// The count is always taken from a fresh read of the document, never
    /// from the cache, so increments are not lost to a stale cached copy.
    pub async fn increment_click(&self, slug: &str) -> Result<Option<Link>, StoreError> {
        self.increment_click_and(slug, |_| {}).await
    }

    /// `increment_click`, running `on_commit` before the write lock is
    /// released: with the written record, or `None` when the slug no longer
    /// exists. Not called when the read or write fails.
    pub async fn increment_click_and<F>(
        &self,
        slug: &str,
        on_commit: F,
    ) -> Result<Option<Link>, StoreError>
    where
        F: FnOnce(Option<&Link>),
    {
        let _guard = self.write_lock.lock().await;

        let mut table = self.read_all().await?;
        let Some(link) = table.links.get_mut(slug) else {
            self.cache.delete(slug);
            on_commit(None);
            return Ok(None);
        };
        link.clicks += 1;
        link.last_accessed = Some(Utc::now());
        let link = link.clone();

        self.write_locked(&mut table).await?;
        self.cache.set(slug, link.clone());
        on_commit(Some(&link));
        tracing::debug!("Link '{}' now at {} click(s)", slug, link.clicks);
        Ok(Some(link))
    }

    /// Totals over the whole table. The error is returned so callers decide
    /// between degrading (pages) and failing (health check).
    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(self.read_all().await?.stats())
    }

    // ── Cache control ──────────────────────────────────────────────────────

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.last_clear_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        tracing::info!("Store cache cleared");
    }

    pub fn clear_slug_cache(&self, slug: &str) {
        self.cache.delete(slug);
    }

    pub fn cached(&self, slug: &str) -> Option<Link> {
        self.cache.get(slug)
    }

    pub fn cache_stats(&self) -> StoreCacheStats {
        let ms = self.last_clear_ms.load(Ordering::Relaxed);
        StoreCacheStats {
            cache: self.cache.stats(),
            last_clear: DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now),
        }
    }
}

async fn create_document(backend: &dyn DocumentBackend) -> Result<String, StoreError> {
    let id = backend.create_document(&LinkTable::empty()).await?;
    tracing::info!("Created gist {} (set GIST_ID={} to reuse it)", id, id);
    Ok(id)
}
