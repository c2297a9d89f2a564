//! In-process [`DocumentStore`] for local runs and tests.

use crate::db::DocumentStore;
use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Documents keyed by `(collection, id)`; clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<DashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.docs.iter().filter(|e| e.key().0 == collection).count()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Vec<u8>, AppError> {
        self.docs
            .get(&(collection.to_string(), id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("{}/{}", collection, id)))
    }

    async fn set(&self, collection: &str, id: &str, bytes: &[u8]) -> Result<(), AppError> {
        self.docs
            .insert((collection.to_string(), id.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError> {
        self.docs.remove(&(collection.to_string(), id.to_string()));
        Ok(())
    }

    async fn list_ids(&self, collection: &str) -> Result<Vec<String>, AppError> {
        let mut ids: Vec<String> = self
            .docs
            .iter()
            .filter(|e| e.key().0 == collection)
            .map(|e| e.key().1.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
