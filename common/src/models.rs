use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity identifier as stored by the owning content storage
pub type ItemId = i64;

/// Unix epoch seconds
pub type Timestamp = i64;

// ============================================================================
// Transition direction
// ============================================================================

/// The two scheduled transitions an item can undergo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    Publish,
    Unpublish,
}

impl Process {
    pub const ALL: [Process; 2] = [Process::Publish, Process::Unpublish];

    pub fn as_str(self) -> &'static str {
        match self {
            Process::Publish => "publish",
            Process::Unpublish => "unpublish",
        }
    }

    /// "published" / "unpublished"
    pub fn past_tense(self) -> &'static str {
        match self {
            Process::Publish => "published",
            Process::Unpublish => "unpublished",
        }
    }

    /// "publishing" / "unpublishing"
    pub fn progressive(self) -> &'static str {
        match self {
            Process::Publish => "publishing",
            Process::Unpublish => "unpublishing",
        }
    }

    /// The scheduling field that drives this transition
    pub fn field(self) -> SchedulingField {
        match self {
            Process::Publish => SchedulingField::PublishOn,
            Process::Unpublish => SchedulingField::UnpublishOn,
        }
    }

    /// Published flag an item ends up with after the built-in transition
    pub fn target_status(self) -> bool {
        matches!(self, Process::Publish)
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted scheduling fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingField {
    PublishOn,
    UnpublishOn,
}

impl SchedulingField {
    /// Column / field machine name
    pub fn column(self) -> &'static str {
        match self {
            SchedulingField::PublishOn => "publish_on",
            SchedulingField::UnpublishOn => "unpublish_on",
        }
    }
}

// ============================================================================
// Content entities
// ============================================================================

/// Bundle (sub-type) metadata of a content kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub label: String,
}

impl Bundle {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// One language variant of a content entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTranslation {
    pub langcode: String,
    pub label: String,
    pub published: bool,
    pub publish_on: Option<Timestamp>,
    pub unpublish_on: Option<Timestamp>,
    pub created: Timestamp,
    pub changed: Timestamp,
}

impl ContentTranslation {
    pub fn new(langcode: impl Into<String>, label: impl Into<String>, created: Timestamp) -> Self {
        Self {
            langcode: langcode.into(),
            label: label.into(),
            published: false,
            publish_on: None,
            unpublish_on: None,
            created,
            changed: created,
        }
    }

    pub fn scheduled(&self, field: SchedulingField) -> Option<Timestamp> {
        match field {
            SchedulingField::PublishOn => self.publish_on,
            SchedulingField::UnpublishOn => self.unpublish_on,
        }
    }

    pub fn set_scheduled(&mut self, field: SchedulingField, value: Option<Timestamp>) {
        match field {
            SchedulingField::PublishOn => self.publish_on = value,
            SchedulingField::UnpublishOn => self.unpublish_on = value,
        }
    }
}

/// A revision requested for the next save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRevision {
    pub log_message: String,
    pub created: Timestamp,
}

/// A content item together with all of its translations
///
/// The first translation is the default translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntity {
    pub id: ItemId,
    pub entity_type: String,
    pub bundle: String,
    pub revision_id: Option<i64>,
    pub translations: Vec<ContentTranslation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_revision: Option<NewRevision>,
}

impl ContentEntity {
    pub fn new(
        id: ItemId,
        entity_type: impl Into<String>,
        bundle: impl Into<String>,
        default_translation: ContentTranslation,
    ) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            revision_id: None,
            translations: vec![default_translation],
            new_revision: None,
        }
    }

    pub fn with_translation(mut self, translation: ContentTranslation) -> Self {
        self.translations.push(translation);
        self
    }

    /// Label of the default translation
    pub fn label(&self) -> &str {
        self.translations
            .first()
            .map(|t| t.label.as_str())
            .unwrap_or_default()
    }

    pub fn langcodes(&self) -> Vec<String> {
        self.translations.iter().map(|t| t.langcode.clone()).collect()
    }

    pub fn translation(&self, langcode: &str) -> Option<&ContentTranslation> {
        self.translations.iter().find(|t| t.langcode == langcode)
    }

    pub fn translation_mut(&mut self, langcode: &str) -> Option<&mut ContentTranslation> {
        self.translations.iter_mut().find(|t| t.langcode == langcode)
    }
}

// ============================================================================
// Schedulable item (transient view of one translation)
// ============================================================================

/// Mutable view of one translation of a content entity
///
/// The executor, extension hooks, event subscribers and actions all work
/// through this handle. Mutations land on the wrapped entity, so the next
/// translation of the same entity observes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulableItem {
    entity: ContentEntity,
    index: usize,
}

impl SchedulableItem {
    /// Wrap `entity` focused on `langcode`; `None` if no such translation
    pub fn new(entity: ContentEntity, langcode: &str) -> Option<Self> {
        let index = entity
            .translations
            .iter()
            .position(|t| t.langcode == langcode)?;
        Some(Self { entity, index })
    }

    /// Wrap `entity` focused on its default translation
    pub fn default_translation(entity: ContentEntity) -> Option<Self> {
        if entity.translations.is_empty() {
            return None;
        }
        Some(Self { entity, index: 0 })
    }

    fn current(&self) -> &ContentTranslation {
        &self.entity.translations[self.index]
    }

    fn current_mut(&mut self) -> &mut ContentTranslation {
        &mut self.entity.translations[self.index]
    }

    pub fn id(&self) -> ItemId {
        self.entity.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity.entity_type
    }

    pub fn bundle(&self) -> &str {
        &self.entity.bundle
    }

    pub fn langcode(&self) -> &str {
        &self.current().langcode
    }

    pub fn label(&self) -> &str {
        &self.current().label
    }

    pub fn scheduled(&self, field: SchedulingField) -> Option<Timestamp> {
        self.current().scheduled(field)
    }

    pub fn set_scheduled(&mut self, field: SchedulingField, value: Option<Timestamp>) {
        self.current_mut().set_scheduled(field, value);
    }

    pub fn publish_on(&self) -> Option<Timestamp> {
        self.current().publish_on
    }

    pub fn set_publish_on(&mut self, value: Option<Timestamp>) {
        self.current_mut().publish_on = value;
    }

    pub fn unpublish_on(&self) -> Option<Timestamp> {
        self.current().unpublish_on
    }

    pub fn set_unpublish_on(&mut self, value: Option<Timestamp>) {
        self.current_mut().unpublish_on = value;
    }

    pub fn is_published(&self) -> bool {
        self.current().published
    }

    pub fn set_published(&mut self, published: bool) {
        self.current_mut().published = published;
    }

    pub fn created(&self) -> Timestamp {
        self.current().created
    }

    pub fn set_created(&mut self, created: Timestamp) {
        self.current_mut().created = created;
    }

    pub fn changed(&self) -> Timestamp {
        self.current().changed
    }

    pub fn set_changed(&mut self, changed: Timestamp) {
        self.current_mut().changed = changed;
    }

    /// Request a new revision on the next save
    pub fn set_new_revision(&mut self, log_message: impl Into<String>, created: Timestamp) {
        self.entity.new_revision = Some(NewRevision {
            log_message: log_message.into(),
            created,
        });
    }

    pub fn new_revision(&self) -> Option<&NewRevision> {
        self.entity.new_revision.as_ref()
    }

    pub fn entity(&self) -> &ContentEntity {
        &self.entity
    }

    pub fn into_entity(self) -> ContentEntity {
        self.entity
    }

    /// Persist the whole entity through `storage`
    pub async fn save(
        &mut self,
        storage: &dyn crate::storage::EntityStorage,
    ) -> Result<(), crate::errors::StorageError> {
        storage.save(&mut self.entity).await
    }
}

/// Format a timestamp the way scheduling messages show dates (UTC)
pub fn format_short_date(timestamp: Timestamp) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format("%m/%d/%Y - %H:%M").to_string(),
        None => timestamp.to_string(),
    }
}
