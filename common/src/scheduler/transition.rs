// Transition executor: one translation of one item through one process

use super::actions::{moderation_action_id, ActionRegistry};
use super::events::{EventDispatcher, SchedulerEventKind};
use super::hooks::HookRegistry;
use super::registry::SchedulerPlugin;
use crate::config::SchedulerSettings;
use crate::errors::SchedulerError;
use crate::models::{format_short_date, Bundle, Process, SchedulableItem, Timestamp};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

/// Terminal state of one translation in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionState {
    /// Nothing scheduled, or scheduled in the future
    Ineligible,
    /// Vetoed by an `…ing_allowed` hook
    Denied,
    /// Unpublish waits for a due publish
    ///
    /// Only a due unpublish is deferred; one not yet due reports `Ineligible`.
    Deferred,
    Committed,
    ExternallyHandled,
    /// A process hook failed; the date was restored
    Failed,
}

impl TransitionState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionState::Ineligible => "ineligible",
            TransitionState::Denied => "denied",
            TransitionState::Deferred => "deferred",
            TransitionState::Committed => "committed",
            TransitionState::ExternallyHandled => "externally_handled",
            TransitionState::Failed => "failed",
        }
    }

    /// Counts as a change for the pass result
    pub fn is_changed(self) -> bool {
        matches!(
            self,
            TransitionState::Committed | TransitionState::ExternallyHandled
        )
    }
}

/// Everything the executor needs for one content kind in one pass
pub struct TransitionContext<'a> {
    pub plugin: &'a dyn SchedulerPlugin,
    pub settings: &'a SchedulerSettings,
    pub hooks: &'a HookRegistry,
    pub events: &'a EventDispatcher,
    pub actions: &'a ActionRegistry,
    pub bundles: &'a [Bundle],
    pub as_of: Timestamp,
}

impl TransitionContext<'_> {
    pub fn bundle_label(&self, bundle: &str) -> String {
        self.bundles
            .iter()
            .find(|b| b.id == bundle)
            .map(|b| b.label.clone())
            .unwrap_or_else(|| bundle.to_string())
    }
}

/// Outcome of `execute`; the item carries every mutation made on the way
#[derive(Debug)]
pub struct Transition {
    pub state: TransitionState,
    pub item: SchedulableItem,
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Run one translation through `process`
///
/// Only a missing action or a storage failure is an error; every other
/// outcome is a `TransitionState`.
#[instrument(
    skip(ctx, item),
    fields(entity_type = %item.entity_type(), id = item.id(), langcode = %item.langcode())
)]
pub async fn execute(
    ctx: &TransitionContext<'_>,
    process: Process,
    mut item: SchedulableItem,
) -> Result<Transition, SchedulerError> {
    let descriptor = ctx.plugin.descriptor();
    let storage = ctx.plugin.storage();
    let field = process.field();

    let scheduled = match item.scheduled(field) {
        Some(ts) if ts <= ctx.as_of => ts,
        _ => {
            return Ok(Transition {
                state: TransitionState::Ineligible,
                item,
            })
        }
    };

    // A due publish date means publishing was blocked; it must complete first
    if process == Process::Unpublish && item.publish_on().is_some_and(|p| p <= ctx.as_of) {
        return Ok(Transition {
            state: TransitionState::Deferred,
            item,
        });
    }

    if !ctx.hooks.is_allowed(descriptor, process, &item) {
        return Ok(Transition {
            state: TransitionState::Denied,
            item,
        });
    }

    item = ctx.events.dispatch(
        SchedulerEventKind::pre(process),
        &descriptor.event_topic,
        item,
    );

    // Audit trail follows the scheduled time, not the wall clock
    item.set_changed(scheduled);

    let bundle = ctx.settings.bundle(&descriptor.entity_type, item.bundle());
    let mut msg_extra = None;
    if process == Process::Publish {
        let old_created = item.created();
        if bundle.publish_touch || (old_created > scheduled && bundle.publish_past_date_created) {
            item.set_created(scheduled);
            msg_extra = Some(format!(
                "The previous creation date was {}, now updated to match the publishing date.",
                format_short_date(old_created)
            ));
        }
    }

    if bundle.revision(process) && storage.is_revisionable() {
        let mut message = format!(
            "{} by Scheduler. The scheduled {} date was {}.",
            capitalize(process.past_tense()),
            process.progressive(),
            format_short_date(scheduled)
        );
        if let Some(extra) = msg_extra {
            message.push(' ');
            message.push_str(&extra);
        }
        item.set_new_revision(message, ctx.as_of);
    }

    // Cleared before any save below so nothing reschedules it
    item.set_scheduled(field, None);

    let outcome = ctx.hooks.invoke_process(descriptor, process, &mut item);
    let bundle_label = ctx.bundle_label(item.bundle());
    let hook_names = outcome.implementations.join(", ");

    if outcome.failed {
        warn!(
            title = %item.label(),
            hooks = %hook_names,
            "{} failed for {}. Calls to {} returned a failure code.",
            capitalize(process.progressive()),
            item.label(),
            hook_names
        );
        item.set_scheduled(field, Some(scheduled));
        item.save(storage.as_ref()).await?;
        return Ok(Transition {
            state: TransitionState::Failed,
            item,
        });
    }

    let state = if outcome.processed {
        info!(
            title = %item.label(),
            hooks = %hook_names,
            "{}: scheduled processing of {} completed by calls to {}.",
            bundle_label,
            item.label(),
            hook_names
        );
        TransitionState::ExternallyHandled
    } else {
        info!(
            title = %item.label(),
            "{}: scheduled {} of {}.",
            bundle_label,
            process.progressive(),
            item.label()
        );
        item.set_published(process.target_status());
        TransitionState::Committed
    };

    item = ctx.events.dispatch(
        SchedulerEventKind::post(process),
        &descriptor.event_topic,
        item,
    );

    let action_id = if ctx.settings.moderation_actions {
        moderation_action_id(&descriptor.entity_type, process)
    } else {
        descriptor.action_id(process).to_string()
    };
    let Some(action) = ctx.actions.get(&action_id) else {
        error!(
            action_id = %action_id,
            "Action '{}' is missing. Use Config Update to import the missing action.",
            action_id
        );
        return Err(SchedulerError::MissingAction { action_id, process });
    };
    action.execute(&mut item, storage.as_ref()).await?;

    Ok(Transition { state, item })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentEntity, ContentTranslation};
    use crate::scheduler::hooks::{HookScope, ProcessResult};
    use crate::scheduler::registry::NodeScheduler;
    use crate::storage::InMemoryStorage;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        storage: Arc<InMemoryStorage>,
        plugin: NodeScheduler,
        settings: SchedulerSettings,
        hooks: HookRegistry,
        events: EventDispatcher,
        actions: ActionRegistry,
        bundles: Vec<Bundle>,
    }

    impl Fixture {
        fn new() -> Self {
            let storage =
                Arc::new(InMemoryStorage::new("node", true).with_bundle("article", "Article"));
            let mut settings = SchedulerSettings::default();
            settings.set_bundle("node", "article", |o| {
                o.publish_enable = Some(true);
                o.unpublish_enable = Some(true);
            });
            Self {
                plugin: NodeScheduler::new(storage.clone()),
                storage,
                settings,
                hooks: HookRegistry::new(),
                events: EventDispatcher::new(),
                actions: ActionRegistry::with_defaults(),
                bundles: vec![Bundle::new("article", "Article")],
            }
        }

        fn ctx(&self) -> TransitionContext<'_> {
            TransitionContext {
                plugin: &self.plugin,
                settings: &self.settings,
                hooks: &self.hooks,
                events: &self.events,
                actions: &self.actions,
                bundles: &self.bundles,
                as_of: NOW,
            }
        }

        fn seed(
            &self,
            publish_on: Option<i64>,
            unpublish_on: Option<i64>,
            published: bool,
        ) -> SchedulableItem {
            let mut t = ContentTranslation::new("en", "Launch", NOW - 500);
            t.publish_on = publish_on;
            t.unpublish_on = unpublish_on;
            t.published = published;
            self.storage.insert(ContentEntity::new(1, "node", "article", t));
            SchedulableItem::default_translation(self.storage.latest(1).unwrap()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_future_date_is_ineligible() {
        let f = Fixture::new();
        let item = f.seed(Some(NOW + 60), None, false);
        let result = execute(&f.ctx(), Process::Publish, item).await.unwrap();
        assert_eq!(result.state, TransitionState::Ineligible);
        assert_eq!(f.storage.save_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_commits() {
        let f = Fixture::new();
        let item = f.seed(Some(NOW - 100), None, false);
        let result = execute(&f.ctx(), Process::Publish, item).await.unwrap();

        assert_eq!(result.state, TransitionState::Committed);
        let stored = f.storage.get(1).unwrap();
        assert!(stored.translations[0].published);
        assert_eq!(stored.translations[0].publish_on, None);
        assert_eq!(stored.translations[0].changed, NOW - 100);
    }

    #[tokio::test]
    async fn test_unpublish_deferred_by_due_publish() {
        let f = Fixture::new();
        let item = f.seed(Some(NOW - 10), Some(NOW - 5), false);
        let result = execute(&f.ctx(), Process::Unpublish, item).await.unwrap();
        assert_eq!(result.state, TransitionState::Deferred);
    }

    #[tokio::test]
    async fn test_unpublish_not_due_is_ineligible_before_deferral() {
        let f = Fixture::new();
        let item = f.seed(Some(NOW - 10), Some(NOW + 60), false);
        let result = execute(&f.ctx(), Process::Unpublish, item).await.unwrap();
        assert_eq!(result.state, TransitionState::Ineligible);
        assert_eq!(f.storage.save_count(), 0);
    }

    #[tokio::test]
    async fn test_revision_message_with_created_reset() {
        let mut f = Fixture::new();
        f.settings.set_bundle("node", "article", |o| {
            o.publish_revision = Some(true);
            o.publish_touch = Some(true);
        });
        let item = f.seed(Some(NOW - 100), None, false);
        execute(&f.ctx(), Process::Publish, item).await.unwrap();

        let logs = f.storage.revision_logs(1);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].created, NOW);
        assert_eq!(
            logs[0].log_message,
            format!(
                "Published by Scheduler. The scheduled publishing date was {}. \
                 The previous creation date was {}, now updated to match the publishing date.",
                format_short_date(NOW - 100),
                format_short_date(NOW - 500)
            )
        );
        assert_eq!(f.storage.get(1).unwrap().translations[0].created, NOW - 100);
    }

    #[tokio::test]
    async fn test_process_hook_failure_restores_date() {
        let mut f = Fixture::new();
        f.hooks = HookRegistry::new().on_process(
            "flaky",
            Process::Publish,
            HookScope::All,
            |_: &mut SchedulableItem| ProcessResult::Failed,
        );
        let item = f.seed(Some(NOW - 100), None, false);
        let result = execute(&f.ctx(), Process::Publish, item).await.unwrap();

        assert_eq!(result.state, TransitionState::Failed);
        let stored = f.storage.get(1).unwrap();
        assert_eq!(stored.translations[0].publish_on, Some(NOW - 100));
        assert!(!stored.translations[0].published);
    }

    #[tokio::test]
    async fn test_externally_handled_skips_builtin_mutation() {
        let mut f = Fixture::new();
        f.hooks = HookRegistry::new().on_process(
            "custom",
            Process::Unpublish,
            HookScope::EntityType("node".to_string()),
            |_: &mut SchedulableItem| ProcessResult::Handled,
        );
        // An action that only saves keeps the flag as the hook left it
        f.actions = ActionRegistry::new().register(Arc::new(
            crate::scheduler::actions::SetStatusAction::new("unpublish_action", true),
        ));
        let item = f.seed(None, Some(NOW - 1), true);
        let result = execute(&f.ctx(), Process::Unpublish, item).await.unwrap();

        assert_eq!(result.state, TransitionState::ExternallyHandled);
        assert!(result.item.is_published());
        assert_eq!(f.storage.get(1).unwrap().translations[0].unpublish_on, None);
    }

    #[tokio::test]
    async fn test_moderation_action_missing() {
        let mut f = Fixture::new();
        f.settings.moderation_actions = true;
        f.actions = ActionRegistry::with_defaults().without("state_change__node__published");
        let item = f.seed(Some(NOW - 100), None, false);

        let err = execute(&f.ctx(), Process::Publish, item).await.unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::MissingAction { ref action_id, .. }
                if action_id == "state_change__node__published"
        ));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("unpublishing"), "Unpublishing");
        assert_eq!(capitalize(""), "");
    }
}
