use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::DocumentBackend;
use crate::{error::StoreError, models::LinkTable};

/// Documents kept in process memory, serialized to JSON the same way the
/// gist backend stores them.
///
/// Used for local runs (`STORE_BACKEND=memory`) and by the tests, which also
/// rely on the fetch/write counters and the failure switch.
#[derive(Default)]
pub struct MemoryBackend {
    documents: RwLock<HashMap<String, String>>,
    fetches: AtomicUsize,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document under a known id.
    pub async fn insert_document(&self, id: &str, table: &LinkTable) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(table)?;
        self.documents.write().await.insert(id.to_owned(), content);
        Ok(())
    }

    /// Seed a document from raw JSON text, as another writer might leave it.
    pub async fn insert_raw(&self, id: &str, content: impl Into<String>) {
        self.documents.write().await.insert(id.to_owned(), content.into());
    }

    /// Raw stored text of a document.
    pub async fn raw_document(&self, id: &str) -> Option<String> {
        self.documents.read().await.get(id).cloned()
    }

    /// Make every following call fail as if the remote API were down.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many times `fetch` reached the backend.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory backend switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn create_document(&self, initial: &LinkTable) -> Result<String, StoreError> {
        self.check_available()?;
        let id = Uuid::new_v4().simple().to_string();
        self.insert_document(&id, initial).await?;
        Ok(id)
    }

    async fn document_exists(&self, id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if self.documents.read().await.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_owned()))
        }
    }

    async fn fetch(&self, id: &str) -> Result<LinkTable, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let documents = self.documents.read().await;
        let content = documents
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
        Ok(serde_json::from_str(content)?)
    }

    async fn replace(&self, id: &str, table: &LinkTable) -> Result<(), StoreError> {
        self.check_available()?;
        let content = serde_json::to_string_pretty(table)?;
        let mut documents = self.documents.write().await;
        match documents.get_mut(id) {
            Some(existing) => {
                *existing = content;
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_owned())),
        }
    }
}
