//! Persistence layer: a byte-oriented document store and the typed
//! credential store built on top of it.

pub mod credentials;
pub mod firestore;
pub mod memory;

pub use credentials::CredentialStore;
pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const COMPANIES: &str = "companies";
}

/// Opaque key-value document storage.
///
/// `get` distinguishes a missing document ([`AppError::NotFound`]) from a
/// storage failure ([`AppError::Database`]).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Vec<u8>, AppError>;

    async fn set(&self, collection: &str, id: &str, bytes: &[u8]) -> Result<(), AppError>;

    /// Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), AppError>;

    async fn list_ids(&self, collection: &str) -> Result<Vec<String>, AppError>;
}
