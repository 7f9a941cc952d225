// Capability registry: one scheduler plugin per content kind

use crate::errors::StorageError;
use crate::models::{Bundle, Process};
use crate::storage::EntityStorage;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Static description of how a content kind is scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    /// Plugin id, e.g. `node_scheduler`
    pub id: String,
    /// Module that provides the plugin
    pub provider: String,
    pub entity_type: String,
    /// Field naming the bundle in messages (`type`, `bundle`)
    pub type_field_name: String,
    pub publish_action: String,
    pub unpublish_action: String,
    /// Prefix of the dispatched event names
    pub event_topic: String,
    /// Module that must be enabled for the plugin to register
    pub dependency: Option<String>,
    pub weight: i32,
    /// Also resolve the legacy node hook names
    pub legacy_hooks: bool,
}

impl CapabilityDescriptor {
    pub fn action_id(&self, process: Process) -> &str {
        match process {
            Process::Publish => &self.publish_action,
            Process::Unpublish => &self.unpublish_action,
        }
    }
}

/// A content-kind adapter
#[async_trait]
pub trait SchedulerPlugin: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    fn storage(&self) -> Arc<dyn EntityStorage>;

    fn entity_type(&self) -> &str {
        &self.descriptor().entity_type
    }

    /// Bundles of this content kind
    async fn bundles(&self) -> Result<Vec<Bundle>, StorageError> {
        self.storage().bundles().await
    }
}

/// Scheduling for `node` content
pub struct NodeScheduler {
    descriptor: CapabilityDescriptor,
    storage: Arc<dyn EntityStorage>,
}

impl NodeScheduler {
    pub fn new(storage: Arc<dyn EntityStorage>) -> Self {
        Self {
            descriptor: CapabilityDescriptor {
                id: "node_scheduler".to_string(),
                provider: "scheduler".to_string(),
                entity_type: "node".to_string(),
                type_field_name: "type".to_string(),
                publish_action: "publish_action".to_string(),
                unpublish_action: "unpublish_action".to_string(),
                event_topic: "scheduler".to_string(),
                dependency: None,
                weight: 0,
                legacy_hooks: true,
            },
            storage,
        }
    }
}

impl SchedulerPlugin for NodeScheduler {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn storage(&self) -> Arc<dyn EntityStorage> {
        self.storage.clone()
    }
}

/// Scheduling for `media` content
pub struct MediaScheduler {
    descriptor: CapabilityDescriptor,
    storage: Arc<dyn EntityStorage>,
}

impl MediaScheduler {
    pub fn new(storage: Arc<dyn EntityStorage>) -> Self {
        Self {
            descriptor: CapabilityDescriptor {
                id: "media_scheduler".to_string(),
                provider: "scheduler".to_string(),
                entity_type: "media".to_string(),
                type_field_name: "bundle".to_string(),
                publish_action: "media_publish_action".to_string(),
                unpublish_action: "media_unpublish_action".to_string(),
                event_topic: "scheduler.media".to_string(),
                dependency: Some("media".to_string()),
                weight: 0,
                legacy_hooks: false,
            },
            storage,
        }
    }
}

impl SchedulerPlugin for MediaScheduler {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    fn storage(&self) -> Arc<dyn EntityStorage> {
        self.storage.clone()
    }
}

/// Registered plugins filtered by the enabled modules
///
/// The unfiltered list is cached as a unit; `invalidate` drops it.
pub struct PluginRegistry {
    definitions: Vec<Arc<dyn SchedulerPlugin>>,
    enabled_modules: RwLock<HashSet<String>>,
    cache: RwLock<Option<Vec<Arc<dyn SchedulerPlugin>>>>,
}

impl PluginRegistry {
    pub fn new<I, S>(enabled_modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            definitions: Vec::new(),
            enabled_modules: RwLock::new(enabled_modules.into_iter().map(Into::into).collect()),
            cache: RwLock::new(None),
        }
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn SchedulerPlugin>) -> Self {
        self.definitions.push(plugin);
        self.invalidate();
        self
    }

    /// Enabled plugins in processing order
    pub fn plugins(&self) -> Vec<Arc<dyn SchedulerPlugin>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return cached.clone();
        }

        let plugins = self.build(None);
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(plugins.clone());
        debug!(count = plugins.len(), "Scheduler plugin cache rebuilt");
        plugins
    }

    /// Enabled plugins; a provider filter bypasses the cache
    pub fn list(&self, provider: Option<&str>) -> Vec<Arc<dyn SchedulerPlugin>> {
        match provider {
            Some(provider) => self.build(Some(provider)),
            None => self.plugins(),
        }
    }

    pub fn get(&self, entity_type: &str) -> Option<Arc<dyn SchedulerPlugin>> {
        self.plugins()
            .into_iter()
            .find(|p| p.entity_type() == entity_type)
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.plugins()
            .iter()
            .map(|p| p.descriptor().clone())
            .collect()
    }

    pub fn entity_types(&self, provider: Option<&str>) -> Vec<String> {
        self.list(provider)
            .iter()
            .map(|p| p.entity_type().to_string())
            .collect()
    }

    pub fn invalidate(&self) {
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Module (de)activation; always invalidates the cache
    pub fn set_module_enabled(&self, module: &str, enabled: bool) {
        {
            let mut modules = self.enabled_modules.write().unwrap_or_else(|e| e.into_inner());
            if enabled {
                modules.insert(module.to_string());
            } else {
                modules.remove(module);
            }
        }
        info!(module, enabled, "Module availability changed");
        self.invalidate();
    }

    fn build(&self, provider: Option<&str>) -> Vec<Arc<dyn SchedulerPlugin>> {
        let modules = self.enabled_modules.read().unwrap_or_else(|e| e.into_inner());

        let mut plugins: Vec<Arc<dyn SchedulerPlugin>> = Vec::new();
        for plugin in &self.definitions {
            let d = plugin.descriptor();
            if d.dependency.as_ref().is_some_and(|m| !modules.contains(m)) {
                continue;
            }
            if provider.is_some_and(|p| p != d.provider) {
                continue;
            }
            // One plugin per content kind; the later definition wins
            match plugins
                .iter_mut()
                .find(|p| p.entity_type() == d.entity_type)
            {
                Some(existing) => *existing = plugin.clone(),
                None => plugins.push(plugin.clone()),
            }
        }

        // Primary kind first: ascending weight, then descending id
        plugins.sort_by(|a, b| {
            let (a, b) = (a.descriptor(), b.descriptor());
            a.weight.cmp(&b.weight).then_with(|| b.id.cmp(&a.id))
        });
        plugins
    }
}
