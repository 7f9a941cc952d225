// In-memory entity storage
//
// Backs tests and the CLI dry runs. Revisions are kept per item; the last
// saved revision becomes the default one.

use super::{DueQuery, EntityStorage};
use crate::errors::StorageError;
use crate::models::{Bundle, ContentEntity, ItemId, NewRevision};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredRevision {
    entity: ContentEntity,
    log: Option<NewRevision>,
}

#[derive(Debug, Default)]
struct Record {
    revisions: Vec<StoredRevision>,
    default_index: usize,
}

impl Record {
    fn default_revision(&self) -> Option<&ContentEntity> {
        self.revisions.get(self.default_index).map(|r| &r.entity)
    }

    fn latest_revision(&self) -> Option<&ContentEntity> {
        self.revisions.last().map(|r| &r.entity)
    }
}

pub struct InMemoryStorage {
    entity_type: String,
    revisionable: bool,
    bundles: Vec<Bundle>,
    records: Mutex<BTreeMap<ItemId, Record>>,
    next_revision_id: AtomicI64,
    saves: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new(entity_type: impl Into<String>, revisionable: bool) -> Self {
        Self {
            entity_type: entity_type.into(),
            revisionable,
            bundles: Vec::new(),
            records: Mutex::new(BTreeMap::new()),
            next_revision_id: AtomicI64::new(1),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn with_bundle(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.bundles.push(Bundle::new(id, label));
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn records(&self) -> std::sync::MutexGuard<'_, BTreeMap<ItemId, Record>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn assign_revision_id(&self, entity: &mut ContentEntity) {
        entity.revision_id = Some(self.next_revision_id.fetch_add(1, Ordering::SeqCst));
    }

    /// Seed an item as a new default revision
    pub fn insert(&self, mut entity: ContentEntity) {
        self.assign_revision_id(&mut entity);
        let mut records = self.records();
        let record = records.entry(entity.id).or_default();
        record.revisions.push(StoredRevision { entity, log: None });
        record.default_index = record.revisions.len() - 1;
    }

    /// Add a pending revision that does not replace the default one
    pub fn insert_draft(&self, mut entity: ContentEntity) {
        self.assign_revision_id(&mut entity);
        let mut records = self.records();
        let record = records.entry(entity.id).or_default();
        record.revisions.push(StoredRevision { entity, log: None });
    }

    /// Snapshot of the default revision
    pub fn get(&self, id: ItemId) -> Option<ContentEntity> {
        self.records()
            .get(&id)
            .and_then(|r| r.default_revision().cloned())
    }

    /// Snapshot of the latest revision
    pub fn latest(&self, id: ItemId) -> Option<ContentEntity> {
        self.records()
            .get(&id)
            .and_then(|r| r.latest_revision().cloned())
    }

    pub fn revision_count(&self, id: ItemId) -> usize {
        self.records().get(&id).map_or(0, |r| r.revisions.len())
    }

    /// Log messages of revisions created through `save`, oldest first
    pub fn revision_logs(&self, id: ItemId) -> Vec<NewRevision> {
        self.records()
            .get(&id)
            .map(|r| r.revisions.iter().filter_map(|rev| rev.log.clone()).collect())
            .unwrap_or_default()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityStorage for InMemoryStorage {
    fn is_revisionable(&self) -> bool {
        self.revisionable
    }

    async fn bundles(&self) -> Result<Vec<Bundle>, StorageError> {
        Ok(self.bundles.clone())
    }

    async fn query_due(&self, query: &DueQuery) -> Result<Vec<ItemId>, StorageError> {
        let records = self.records();
        let mut due: Vec<(i64, ItemId)> = records
            .iter()
            .filter_map(|(id, record)| {
                let entity = if query.latest_revision {
                    record.latest_revision()
                } else {
                    record.default_revision()
                }?;
                if !query.bundles.iter().any(|b| *b == entity.bundle) {
                    return None;
                }
                entity
                    .translations
                    .iter()
                    .filter_map(|t| t.scheduled(query.field))
                    .filter(|ts| *ts <= query.as_of)
                    .min()
                    .map(|ts| (ts, *id))
            })
            .collect();

        due.sort_unstable();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }

    async fn load(&self, id: ItemId) -> Result<Option<ContentEntity>, StorageError> {
        Ok(self.get(id))
    }

    async fn load_latest_revision(
        &self,
        id: ItemId,
    ) -> Result<Option<ContentEntity>, StorageError> {
        Ok(self.latest(id))
    }

    async fn save(&self, entity: &mut ContentEntity) -> Result<(), StorageError> {
        let log = entity.new_revision.take();
        let mut records = self.records();
        let record = records
            .get_mut(&entity.id)
            .ok_or_else(|| StorageError::NotFound(format!("{} {}", self.entity_type, entity.id)))?;

        if log.is_some() && self.revisionable {
            entity.revision_id = Some(self.next_revision_id.fetch_add(1, Ordering::SeqCst));
            record.revisions.push(StoredRevision {
                entity: entity.clone(),
                log,
            });
            record.default_index = record.revisions.len() - 1;
        } else {
            let position = record
                .revisions
                .iter()
                .position(|r| r.entity.revision_id == entity.revision_id)
                .ok_or_else(|| {
                    StorageError::InvalidData(format!(
                        "{} {} has no revision {:?}",
                        self.entity_type, entity.id, entity.revision_id
                    ))
                })?;
            record.revisions[position].entity = entity.clone();
            record.default_index = position;
        }

        self.saves.fetch_add(1, Ordering::SeqCst);
        debug!(
            entity_type = %self.entity_type,
            id = entity.id,
            revision_id = ?entity.revision_id,
            "Entity saved"
        );
        Ok(())
    }
}
