// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Typed storage of users and companies as opaque blobs.
//!
//! Every call is bounded by the configured I/O timeout. Writes to the same
//! entity are serialized through a per-key async mutex, and
//! read-modify-write goes through [`CredentialStore::update_user`] /
//! [`CredentialStore::update_company`] so the notifier and command handlers
//! never overwrite each other's fields. A lock entry lives while its record
//! exists or a caller holds it, so the lock map is bounded by the number of
//! stored records plus in-flight calls.
//!
//! With a [`CredentialCipher`] configured, company passwords are sealed on
//! every write and opened on every read; callers only see plaintext.

use crate::db::{collections, DocumentStore};
use crate::error::AppError;
use crate::models::{Company, User};
use crate::services::crypto::CredentialCipher;
use crate::time_utils::bounded;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Kind of stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Company,
}

impl EntityKind {
    fn collection(self) -> &'static str {
        match self {
            EntityKind::User => collections::USERS,
            EntityKind::Company => collections::COMPANIES,
        }
    }
}

/// Per-entity write locks, shared by all clones of the store.
type EntityLocks = Arc<DashMap<(EntityKind, String), Arc<Mutex<()>>>>;

/// Credential store over any [`DocumentStore`].
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn DocumentStore>,
    /// Prefix separating deployments that share one database
    namespace: String,
    timeout: Duration,
    locks: EntityLocks,
    cipher: Option<CredentialCipher>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn DocumentStore>, namespace: &str, timeout: Duration) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            timeout,
            locks: Arc::new(DashMap::new()),
            cipher: None,
        }
    }

    /// Seal company passwords with `cipher`.
    pub fn with_cipher(mut self, cipher: Option<CredentialCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    fn collection(&self, kind: EntityKind) -> String {
        format!("{}_{}", self.namespace, kind.collection())
    }

    fn lock_for(&self, kind: EntityKind, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((kind, id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry of a record that no longer exists.
    ///
    /// Must be called while holding `lock_for(kind, id)`. The entry is kept
    /// when anyone else has cloned it (the map's copy plus ours make two).
    fn forget_lock(&self, kind: EntityKind, id: &str) {
        self.locks
            .remove_if(&(kind, id.to_string()), |_, lock| Arc::strong_count(lock) <= 2);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }

    // ─── Untyped blob operations ─────────────────────────────────

    /// Load and decode a record. Missing records yield [`AppError::NotFound`].
    async fn load<T: DeserializeOwned>(&self, kind: EntityKind, id: &str) -> Result<T, AppError> {
        let collection = self.collection(kind);
        let bytes = bounded(self.timeout, "store get", self.store.get(&collection, id)).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Database(format!("Failed to decode {}/{}: {}", collection, id, e))
        })
    }

    /// Encode and store a record, replacing any previous version.
    async fn save<T: Serialize>(&self, kind: EntityKind, id: &str, value: &T) -> Result<(), AppError> {
        let lock = self.lock_for(kind, id);
        let _guard = lock.lock().await;
        self.write(kind, id, value).await
    }

    async fn write<T: Serialize>(&self, kind: EntityKind, id: &str, value: &T) -> Result<(), AppError> {
        let collection = self.collection(kind);
        let bytes = serde_json::to_vec(value)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Encode {}/{}: {}", collection, id, e)))?;
        bounded(self.timeout, "store set", self.store.set(&collection, id, &bytes)).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<(), AppError> {
        let lock = self.lock_for(kind, id);
        let _guard = lock.lock().await;
        let collection = self.collection(kind);
        bounded(self.timeout, "store delete", self.store.delete(&collection, id)).await?;
        self.forget_lock(kind, id);
        Ok(())
    }

    async fn list_ids(&self, kind: EntityKind) -> Result<Vec<String>, AppError> {
        let collection = self.collection(kind);
        bounded(self.timeout, "store list", self.store.list_ids(&collection)).await
    }

    /// Read, mutate and write back one record while holding its lock.
    ///
    /// The record is re-read under the lock, so changes made by other
    /// writers since the caller last looked are preserved.
    async fn update<T, F>(&self, kind: EntityKind, id: &str, mutate: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let lock = self.lock_for(kind, id);
        let _guard = lock.lock().await;
        let mut value: T = match self.load(kind, id).await {
            Ok(value) => value,
            Err(e) => {
                if matches!(e, AppError::NotFound(_)) {
                    self.forget_lock(kind, id);
                }
                return Err(e);
            }
        };
        mutate(&mut value);
        self.write(kind, id, &value).await?;
        Ok(value)
    }

    // ─── User Operations ─────────────────────────────────────────

    pub async fn load_user(&self, id: i64) -> Result<User, AppError> {
        self.load(EntityKind::User, &id.to_string()).await
    }

    pub async fn save_user(&self, user: &User) -> Result<(), AppError> {
        self.save(EntityKind::User, &user.id.to_string(), user).await
    }

    pub async fn update_user<F>(&self, id: i64, mutate: F) -> Result<User, AppError>
    where
        F: FnOnce(&mut User),
    {
        self.update(EntityKind::User, &id.to_string(), mutate).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), AppError> {
        self.delete(EntityKind::User, &id.to_string()).await
    }

    /// All stored user ids; ids that don't parse are logged and skipped.
    pub async fn list_user_ids(&self) -> Result<Vec<i64>, AppError> {
        Ok(parse_ids(self.list_ids(EntityKind::User).await?, EntityKind::User))
    }

    // ─── Company Operations ──────────────────────────────────────

    pub async fn load_company(&self, id: i64) -> Result<Company, AppError> {
        let mut company: Company = self.load(EntityKind::Company, &id.to_string()).await?;
        if let Some(cipher) = &self.cipher {
            company.password = cipher.open(&company.password)?;
        }
        Ok(company)
    }

    pub async fn save_company(&self, company: &Company) -> Result<(), AppError> {
        let key = company.id.to_string();
        let lock = self.lock_for(EntityKind::Company, &key);
        let _guard = lock.lock().await;
        self.write_company(company).await
    }

    async fn write_company(&self, company: &Company) -> Result<(), AppError> {
        let key = company.id.to_string();
        match &self.cipher {
            Some(cipher) => {
                let mut sealed = company.clone();
                sealed.password = cipher.seal(&company.password)?;
                self.write(EntityKind::Company, &key, &sealed).await
            }
            None => self.write(EntityKind::Company, &key, company).await,
        }
    }

    /// Read, mutate and write back one company while holding its lock.
    pub async fn update_company<F>(&self, id: i64, mutate: F) -> Result<Company, AppError>
    where
        F: FnOnce(&mut Company),
    {
        let key = id.to_string();
        let lock = self.lock_for(EntityKind::Company, &key);
        let _guard = lock.lock().await;
        let mut company = match self.load_company(id).await {
            Ok(company) => company,
            Err(e) => {
                if matches!(e, AppError::NotFound(_)) {
                    self.forget_lock(EntityKind::Company, &key);
                }
                return Err(e);
            }
        };
        mutate(&mut company);
        self.write_company(&company).await?;
        Ok(company)
    }

    /// Merge what was learned from the portal into the stored company.
    ///
    /// Credentials stay as stored, so a concurrent re-authentication isn't
    /// undone, and a company deleted in the meantime is not recreated.
    pub async fn store_refresh(&self, fresh: &Company) -> Result<Company, AppError> {
        self.update_company(fresh.id, |stored| stored.absorb_refresh(fresh))
            .await
    }

    pub async fn delete_company(&self, id: i64) -> Result<(), AppError> {
        self.delete(EntityKind::Company, &id.to_string()).await
    }

    pub async fn list_company_ids(&self) -> Result<Vec<i64>, AppError> {
        Ok(parse_ids(
            self.list_ids(EntityKind::Company).await?,
            EntityKind::Company,
        ))
    }
}

fn parse_ids(raw: Vec<String>, kind: EntityKind) -> Vec<i64> {
    raw.into_iter()
        .filter_map(|id| match id.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                tracing::warn!(?kind, id = %id, "Skipping record with non-numeric id");
                None
            }
        })
        .collect()
}
