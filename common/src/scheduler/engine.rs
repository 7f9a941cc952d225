// Scheduler engine: the publish and unpublish passes

use super::actions::ActionRegistry;
use super::events::EventDispatcher;
use super::hooks::{HookPoint, HookRegistry};
use super::registry::{PluginRegistry, SchedulerPlugin};
use super::report::{ItemOutcome, PassReport};
use super::selector::{dedupe, select_due};
use super::transition::{execute, TransitionContext};
use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerSettings;
use crate::errors::SchedulerError;
use crate::models::{ContentEntity, Process, SchedulableItem, Timestamp};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Runs scheduled transitions across every enabled content kind
///
/// Holds no state between passes apart from its collaborators; settings are
/// snapshotted at the start of each pass.
pub struct SchedulerManager {
    settings: RwLock<Arc<SchedulerSettings>>,
    registry: Arc<PluginRegistry>,
    hooks: Arc<HookRegistry>,
    events: Arc<EventDispatcher>,
    actions: Arc<ActionRegistry>,
    clock: Arc<dyn Clock>,
}

impl SchedulerManager {
    pub fn new(settings: SchedulerSettings, registry: Arc<PluginRegistry>) -> Self {
        Self {
            settings: RwLock::new(Arc::new(settings)),
            registry,
            hooks: Arc::new(HookRegistry::new()),
            events: Arc::new(EventDispatcher::new()),
            actions: Arc::new(ActionRegistry::with_defaults()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_events(mut self, events: EventDispatcher) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = Arc::new(actions);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> Arc<SchedulerSettings> {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the settings; passes already running keep their snapshot
    pub fn update_settings(&self, settings: SchedulerSettings) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(settings);
        debug!("Scheduler settings updated");
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Entity types handled by the enabled plugins
    pub fn enabled_types(&self) -> Vec<String> {
        self.registry.entity_types(None)
    }

    /// Publish every due item; true if anything was transitioned
    pub async fn publish(&self) -> Result<bool, SchedulerError> {
        Ok(self.run(Process::Publish).await?.changed())
    }

    /// Unpublish every due item; true if anything was transitioned
    pub async fn unpublish(&self) -> Result<bool, SchedulerError> {
        Ok(self.run(Process::Unpublish).await?.changed())
    }

    pub async fn run(&self, process: Process) -> Result<PassReport, SchedulerError> {
        self.run_at(process, self.clock.now()).await
    }

    /// One pass at a fixed time
    ///
    /// A disabled bundle, a missing action or a storage failure halts the
    /// pass; per-item hook failures do not.
    #[instrument(skip(self), fields(process = %process))]
    pub async fn run_at(
        &self,
        process: Process,
        as_of: Timestamp,
    ) -> Result<PassReport, SchedulerError> {
        let started = Instant::now();
        let settings = self.settings();
        let mut report = PassReport::new(process, as_of);

        for plugin in self.registry.plugins() {
            self.process_plugin(plugin.as_ref(), &settings, process, as_of, &mut report)
                .await?;
        }

        report.finish(started.elapsed());
        if settings.log {
            report.log_summary();
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(entity_type = %plugin.entity_type()))]
    async fn process_plugin(
        &self,
        plugin: &dyn SchedulerPlugin,
        settings: &SchedulerSettings,
        process: Process,
        as_of: Timestamp,
        report: &mut PassReport,
    ) -> Result<(), SchedulerError> {
        let descriptor = plugin.descriptor();
        let entity_type = plugin.entity_type();

        let mut ids = select_due(plugin, settings, process, as_of).await?;
        ids.extend(self.hooks.invoke_list(descriptor, process));
        self.hooks.invoke_list_alter(descriptor, &mut ids, process);
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Ok(());
        }
        debug!(count = ids.len(), "Candidates collected");

        let storage = plugin.storage();
        let bundles = plugin.bundles().await?;
        let ctx = TransitionContext {
            plugin,
            settings,
            hooks: &self.hooks,
            events: &self.events,
            actions: &self.actions,
            bundles: &bundles,
            as_of,
        };

        for id in ids {
            let loaded = if storage.is_revisionable() {
                storage.load_latest_revision(id).await?
            } else {
                storage.load(id).await?
            };
            let Some(mut entity) = loaded else {
                info!(
                    entity_id = id,
                    "Entity id {} is not a {} entity. Processing skipped.",
                    id,
                    entity_type
                );
                continue;
            };

            if !settings.bundle(entity_type, &entity.bundle).enabled(process) {
                return Err(self.not_enabled(&ctx, process, &entity));
            }

            for langcode in entity.langcodes() {
                let Some(item) = SchedulableItem::new(entity.clone(), &langcode) else {
                    continue;
                };
                let transition = execute(&ctx, process, item).await?;
                report.record(ItemOutcome {
                    entity_type: entity_type.to_string(),
                    id,
                    langcode,
                    state: transition.state,
                });
                // Later translations see what this one changed
                entity = transition.item.into_entity();
            }
        }
        Ok(())
    }

    fn not_enabled(
        &self,
        ctx: &TransitionContext<'_>,
        process: Process,
        entity: &ContentEntity,
    ) -> SchedulerError {
        let descriptor = ctx.plugin.descriptor();
        let mut hooks = self.hooks.implementations(descriptor, HookPoint::List);
        hooks.extend(self.hooks.implementations(descriptor, HookPoint::ListAlter));
        hooks.sort();
        hooks.dedup();

        SchedulerError::EntityTypeNotEnabled {
            id: entity.id,
            label: entity.label().to_string(),
            process,
            entity_type: descriptor.entity_type.clone(),
            type_field: descriptor.type_field_name.clone(),
            bundle_label: ctx.bundle_label(&entity.bundle),
            hooks,
        }
    }
}
