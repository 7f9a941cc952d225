// State-change actions resolved by id at execution time

use crate::errors::StorageError;
use crate::models::{Process, SchedulableItem};
use crate::storage::EntityStorage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Action that performs the visible state change and persists the item
#[async_trait]
pub trait EntityAction: Send + Sync {
    fn id(&self) -> &str;

    async fn execute(
        &self,
        item: &mut SchedulableItem,
        storage: &dyn EntityStorage,
    ) -> Result<(), StorageError>;
}

/// Sets the published flag and saves
pub struct SetStatusAction {
    id: String,
    published: bool,
}

impl SetStatusAction {
    pub fn new(id: impl Into<String>, published: bool) -> Self {
        Self {
            id: id.into(),
            published,
        }
    }

    /// `publish_action` / `<entity_type>_publish_action`
    pub fn for_process(entity_type: &str, process: Process) -> Self {
        let id = if entity_type == "node" {
            format!("{}_action", process.as_str())
        } else {
            format!("{}_{}_action", entity_type, process.as_str())
        };
        Self::new(id, process.target_status())
    }
}

#[async_trait]
impl EntityAction for SetStatusAction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        item: &mut SchedulableItem,
        storage: &dyn EntityStorage,
    ) -> Result<(), StorageError> {
        item.set_published(self.published);
        item.save(storage).await
    }
}

/// Content-moderation transition to a workflow state
pub struct ModerationStateAction {
    id: String,
    state: String,
}

impl ModerationStateAction {
    /// `state_change__<entity_type>__published` / `…__archived`
    pub fn for_process(entity_type: &str, process: Process) -> Self {
        let state = match process {
            Process::Publish => "published",
            Process::Unpublish => "archived",
        };
        Self {
            id: moderation_action_id(entity_type, process),
            state: state.to_string(),
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }
}

#[async_trait]
impl EntityAction for ModerationStateAction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(
        &self,
        item: &mut SchedulableItem,
        storage: &dyn EntityStorage,
    ) -> Result<(), StorageError> {
        item.set_published(self.state == "published");
        debug!(id = item.id(), state = %self.state, "Moderation state changed");
        item.save(storage).await
    }
}

pub fn moderation_action_id(entity_type: &str, process: Process) -> String {
    let state = match process {
        Process::Publish => "published",
        Process::Unpublish => "archived",
    };
    format!("state_change__{}__{}", entity_type, state)
}

/// Actions by id
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn EntityAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status and moderation actions of the built-in content kinds
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for entity_type in ["node", "media"] {
            for process in Process::ALL {
                registry = registry
                    .register(Arc::new(SetStatusAction::for_process(entity_type, process)))
                    .register(Arc::new(ModerationStateAction::for_process(
                        entity_type,
                        process,
                    )));
            }
        }
        registry
    }

    pub fn register(mut self, action: Arc<dyn EntityAction>) -> Self {
        self.actions.insert(action.id().to_string(), action);
        self
    }

    pub fn without(mut self, id: &str) -> Self {
        self.actions.remove(id);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn EntityAction>> {
        self.actions.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.actions.keys().cloned().collect();
        ids.sort();
        ids
    }
}
