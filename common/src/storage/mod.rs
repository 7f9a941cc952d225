// Entity storage collaborator
//
// Each content kind owns one storage; the engine reads due ids, loads
// entities and persists them back only through this trait.

pub mod memory;
pub mod postgres_storage;

pub use memory::InMemoryStorage;
pub use postgres_storage::PostgresStorage;

use crate::errors::StorageError;
use crate::models::{Bundle, ContentEntity, ItemId, SchedulingField, Timestamp};
use async_trait::async_trait;

/// Due-item query for one content kind and process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueQuery {
    pub field: SchedulingField,
    pub as_of: Timestamp,
    /// Bundles enabled for the process; never empty
    pub bundles: Vec<String>,
    /// Match the latest revision instead of the default one
    pub latest_revision: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStorage: Send + Sync {
    /// Whether this content kind keeps revisions
    fn is_revisionable(&self) -> bool;

    /// Bundle metadata of this content kind
    async fn bundles(&self) -> Result<Vec<Bundle>, StorageError>;

    /// Ids of items with any translation due, earliest due first
    async fn query_due(&self, query: &DueQuery) -> Result<Vec<ItemId>, StorageError>;

    /// Load the default revision
    async fn load(&self, id: ItemId) -> Result<Option<ContentEntity>, StorageError>;

    /// Load the latest revision, which may be a pending draft
    async fn load_latest_revision(&self, id: ItemId)
        -> Result<Option<ContentEntity>, StorageError>;

    /// Persist the entity; a pending `new_revision` is consumed
    async fn save(&self, entity: &mut ContentEntity) -> Result<(), StorageError>;
}
