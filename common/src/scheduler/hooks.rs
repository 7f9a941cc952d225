// Extension pipeline
//
// Third-party modules register callbacks against a hook point at startup.
// A point resolves, per content kind, to the kind-agnostic name, the
// kind-qualified name `<entity_type>_<point>` and, for kinds with legacy
// hooks, the legacy alias. Callbacks run grouped by resolved name in that
// order, registration order within a name.

use super::registry::CapabilityDescriptor;
use crate::errors::HookError;
use crate::models::{ItemId, Process, SchedulableItem};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Extension point identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Extra candidate ids
    List,
    /// In-place edit of the candidate ids
    ListAlter,
    /// `publishing_allowed` / `unpublishing_allowed`
    Allowed(Process),
    /// `publish_process` / `unpublish_process`
    Process(Process),
}

impl HookPoint {
    pub const ALL: [HookPoint; 6] = [
        HookPoint::List,
        HookPoint::ListAlter,
        HookPoint::Allowed(Process::Publish),
        HookPoint::Allowed(Process::Unpublish),
        HookPoint::Process(Process::Publish),
        HookPoint::Process(Process::Unpublish),
    ];

    pub fn name(self) -> &'static str {
        match self {
            HookPoint::List => "list",
            HookPoint::ListAlter => "list_alter",
            HookPoint::Allowed(Process::Publish) => "publishing_allowed",
            HookPoint::Allowed(Process::Unpublish) => "unpublishing_allowed",
            HookPoint::Process(Process::Publish) => "publish_process",
            HookPoint::Process(Process::Unpublish) => "unpublish_process",
        }
    }

    /// Name used by the legacy node hooks
    pub fn legacy_name(self) -> &'static str {
        match self {
            HookPoint::List => "nid_list",
            HookPoint::ListAlter => "nid_list_alter",
            HookPoint::Allowed(Process::Publish) => "allow_publishing",
            HookPoint::Allowed(Process::Unpublish) => "allow_unpublishing",
            HookPoint::Process(Process::Publish) => "publish_action",
            HookPoint::Process(Process::Unpublish) => "unpublish_action",
        }
    }

    /// Resolve a hook name such as `list`, `media_list_alter` or `nid_list`
    pub fn parse(name: &str) -> Option<(HookPoint, HookScope)> {
        for point in HookPoint::ALL {
            if name == point.name() {
                return Some((point, HookScope::All));
            }
            if name == point.legacy_name() {
                return Some((point, HookScope::Legacy));
            }
        }
        // Longest point name first so `x_list_alter` is not read as `x_list`
        let mut points = HookPoint::ALL;
        points.sort_by_key(|p| std::cmp::Reverse(p.name().len()));
        points.into_iter().find_map(|point| {
            let entity_type = name.strip_suffix(point.name())?.strip_suffix('_')?;
            (!entity_type.is_empty())
                .then(|| (point, HookScope::EntityType(entity_type.to_string())))
        })
    }

    fn accepts(self, handler: &HookHandler) -> bool {
        matches!(
            (self, handler),
            (HookPoint::List, HookHandler::List(_))
                | (HookPoint::ListAlter, HookHandler::ListAlter(_))
                | (HookPoint::Allowed(_), HookHandler::Allowed(_))
                | (HookPoint::Process(_), HookHandler::Process(_))
        )
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which content kinds a registration applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookScope {
    All,
    EntityType(String),
    /// Legacy alias, only for kinds with legacy hooks
    Legacy,
}

impl HookScope {
    fn resolved_name(&self, point: HookPoint) -> String {
        match self {
            HookScope::All => point.name().to_string(),
            HookScope::EntityType(entity_type) => format!("{}_{}", entity_type, point.name()),
            HookScope::Legacy => point.legacy_name().to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            HookScope::All => 0,
            HookScope::EntityType(_) => 1,
            HookScope::Legacy => 2,
        }
    }

    fn applies_to(&self, descriptor: &CapabilityDescriptor) -> bool {
        match self {
            HookScope::All => true,
            HookScope::EntityType(entity_type) => *entity_type == descriptor.entity_type,
            HookScope::Legacy => descriptor.legacy_hooks,
        }
    }
}

/// Result of one process callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    NotHandled,
    Handled,
    Failed,
}

pub trait ListHook: Send + Sync {
    fn list(&self, process: Process, entity_type: &str) -> Vec<ItemId>;
}

pub trait ListAlterHook: Send + Sync {
    fn list_alter(&self, ids: &mut Vec<ItemId>, process: Process, entity_type: &str);
}

pub trait AllowedHook: Send + Sync {
    /// `Some(false)` denies; `None` abstains
    fn allowed(&self, item: &SchedulableItem) -> Option<bool>;
}

pub trait ProcessHook: Send + Sync {
    fn process(&self, item: &mut SchedulableItem) -> ProcessResult;
}

impl<F> ListHook for F
where
    F: Fn(Process, &str) -> Vec<ItemId> + Send + Sync,
{
    fn list(&self, process: Process, entity_type: &str) -> Vec<ItemId> {
        self(process, entity_type)
    }
}

impl<F> ListAlterHook for F
where
    F: Fn(&mut Vec<ItemId>, Process, &str) + Send + Sync,
{
    fn list_alter(&self, ids: &mut Vec<ItemId>, process: Process, entity_type: &str) {
        self(ids, process, entity_type)
    }
}

impl<F> AllowedHook for F
where
    F: Fn(&SchedulableItem) -> Option<bool> + Send + Sync,
{
    fn allowed(&self, item: &SchedulableItem) -> Option<bool> {
        self(item)
    }
}

impl<F> ProcessHook for F
where
    F: Fn(&mut SchedulableItem) -> ProcessResult + Send + Sync,
{
    fn process(&self, item: &mut SchedulableItem) -> ProcessResult {
        self(item)
    }
}

/// Callback object for one hook point
#[derive(Clone)]
pub enum HookHandler {
    List(Arc<dyn ListHook>),
    ListAlter(Arc<dyn ListAlterHook>),
    Allowed(Arc<dyn AllowedHook>),
    Process(Arc<dyn ProcessHook>),
}

impl fmt::Debug for HookHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            HookHandler::List(_) => "List",
            HookHandler::ListAlter(_) => "ListAlter",
            HookHandler::Allowed(_) => "Allowed",
            HookHandler::Process(_) => "Process",
        };
        f.debug_tuple(kind).finish()
    }
}

#[derive(Debug, Clone)]
struct Registration {
    module: String,
    point: HookPoint,
    scope: HookScope,
    handler: HookHandler,
}

impl Registration {
    fn implementation_name(&self) -> String {
        format!(
            "{}_scheduler_{}",
            self.module,
            self.scope.resolved_name(self.point)
        )
    }
}

/// Aggregated result of a process point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// At least one callback handled the transition
    pub processed: bool,
    /// At least one callback failed; takes precedence over `processed`
    pub failed: bool,
    /// Implementation names consulted
    pub implementations: Vec<String>,
}

/// Registered extension callbacks
#[derive(Debug, Default, Clone)]
pub struct HookRegistry {
    registrations: Vec<Registration>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; its kind must match the point
    pub fn register(
        &mut self,
        module: &str,
        point: HookPoint,
        scope: HookScope,
        handler: HookHandler,
    ) -> Result<(), HookError> {
        if !point.accepts(&handler) {
            return Err(HookError::SignatureMismatch {
                point: scope.resolved_name(point),
            });
        }
        debug!(module, hook = %scope.resolved_name(point), "Hook registered");
        self.registrations.push(Registration {
            module: module.to_string(),
            point,
            scope,
            handler,
        });
        Ok(())
    }

    /// Register under a hook name such as `node_publishing_allowed`
    pub fn register_named(
        &mut self,
        module: &str,
        name: &str,
        handler: HookHandler,
    ) -> Result<(), HookError> {
        let (point, scope) =
            HookPoint::parse(name).ok_or_else(|| HookError::UnknownPoint(name.to_string()))?;
        self.register(module, point, scope, handler)
    }

    pub fn on_list<H: ListHook + 'static>(
        mut self,
        module: &str,
        scope: HookScope,
        hook: H,
    ) -> Self {
        self.push(module, HookPoint::List, scope, HookHandler::List(Arc::new(hook)));
        self
    }

    pub fn on_list_alter<H: ListAlterHook + 'static>(
        mut self,
        module: &str,
        scope: HookScope,
        hook: H,
    ) -> Self {
        self.push(
            module,
            HookPoint::ListAlter,
            scope,
            HookHandler::ListAlter(Arc::new(hook)),
        );
        self
    }

    pub fn on_allowed<H: AllowedHook + 'static>(
        mut self,
        module: &str,
        process: Process,
        scope: HookScope,
        hook: H,
    ) -> Self {
        self.push(
            module,
            HookPoint::Allowed(process),
            scope,
            HookHandler::Allowed(Arc::new(hook)),
        );
        self
    }

    pub fn on_process<H: ProcessHook + 'static>(
        mut self,
        module: &str,
        process: Process,
        scope: HookScope,
        hook: H,
    ) -> Self {
        self.push(
            module,
            HookPoint::Process(process),
            scope,
            HookHandler::Process(Arc::new(hook)),
        );
        self
    }

    fn push(&mut self, module: &str, point: HookPoint, scope: HookScope, handler: HookHandler) {
        self.registrations.push(Registration {
            module: module.to_string(),
            point,
            scope,
            handler,
        });
    }

    /// Registrations resolved for a content kind, in invocation order
    fn resolve<'a>(
        &'a self,
        descriptor: &'a CapabilityDescriptor,
        point: HookPoint,
    ) -> impl Iterator<Item = &'a Registration> + 'a {
        let mut matching: Vec<&Registration> = self
            .registrations
            .iter()
            .filter(|r| r.point == point && r.scope.applies_to(descriptor))
            .collect();
        // Stable sort keeps registration order within a name
        matching.sort_by_key(|r| r.scope.rank());
        matching.into_iter()
    }

    /// Implementation names of a point for a content kind
    pub fn implementations(
        &self,
        descriptor: &CapabilityDescriptor,
        point: HookPoint,
    ) -> Vec<String> {
        self.resolve(descriptor, point)
            .map(Registration::implementation_name)
            .collect()
    }

    /// Union of the ids returned by every `list` callback
    pub fn invoke_list(&self, descriptor: &CapabilityDescriptor, process: Process) -> Vec<ItemId> {
        let mut ids = Vec::new();
        for registration in self.resolve(descriptor, HookPoint::List) {
            if let HookHandler::List(hook) = &registration.handler {
                let added = hook.list(process, &descriptor.entity_type);
                trace!(
                    hook = %registration.implementation_name(),
                    count = added.len(),
                    "list hook"
                );
                ids.extend(added);
            }
        }
        ids
    }

    pub fn invoke_list_alter(
        &self,
        descriptor: &CapabilityDescriptor,
        ids: &mut Vec<ItemId>,
        process: Process,
    ) {
        for registration in self.resolve(descriptor, HookPoint::ListAlter) {
            if let HookHandler::ListAlter(hook) = &registration.handler {
                hook.list_alter(ids, process, &descriptor.entity_type);
            }
        }
    }

    /// Allowed unless some callback explicitly denies
    ///
    /// Every callback runs even after a denial.
    pub fn is_allowed(
        &self,
        descriptor: &CapabilityDescriptor,
        process: Process,
        item: &SchedulableItem,
    ) -> bool {
        let mut allowed = true;
        for registration in self.resolve(descriptor, HookPoint::Allowed(process)) {
            if let HookHandler::Allowed(hook) = &registration.handler {
                if hook.allowed(item) == Some(false) {
                    debug!(
                        hook = %registration.implementation_name(),
                        id = item.id(),
                        "{} denied",
                        process.progressive()
                    );
                    allowed = false;
                }
            }
        }
        allowed
    }

    pub fn invoke_process(
        &self,
        descriptor: &CapabilityDescriptor,
        process: Process,
        item: &mut SchedulableItem,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        for registration in self.resolve(descriptor, HookPoint::Process(process)) {
            if let HookHandler::Process(hook) = &registration.handler {
                outcome.implementations.push(registration.implementation_name());
                match hook.process(item) {
                    ProcessResult::Handled => outcome.processed = true,
                    ProcessResult::Failed => outcome.failed = true,
                    ProcessResult::NotHandled => {}
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentEntity, ContentTranslation};
    use crate::scheduler::registry::{MediaScheduler, NodeScheduler, SchedulerPlugin};
    use crate::storage::InMemoryStorage;
    use std::sync::Mutex;

    fn node() -> CapabilityDescriptor {
        NodeScheduler::new(Arc::new(InMemoryStorage::new("node", true)))
            .descriptor()
            .clone()
    }

    fn media() -> CapabilityDescriptor {
        MediaScheduler::new(Arc::new(InMemoryStorage::new("media", false)))
            .descriptor()
            .clone()
    }

    fn item() -> SchedulableItem {
        let entity =
            ContentEntity::new(1, "node", "article", ContentTranslation::new("en", "A", 0));
        SchedulableItem::default_translation(entity).unwrap()
    }

    #[test]
    fn test_parse_hook_names() {
        assert_eq!(HookPoint::parse("list"), Some((HookPoint::List, HookScope::All)));
        assert_eq!(
            HookPoint::parse("media_list_alter"),
            Some((
                HookPoint::ListAlter,
                HookScope::EntityType("media".to_string())
            ))
        );
        assert_eq!(
            HookPoint::parse("node_unpublish_process"),
            Some((
                HookPoint::Process(Process::Unpublish),
                HookScope::EntityType("node".to_string())
            ))
        );
        assert_eq!(
            HookPoint::parse("allow_publishing"),
            Some((HookPoint::Allowed(Process::Publish), HookScope::Legacy))
        );
        assert_eq!(HookPoint::parse("cron"), None);
    }

    #[test]
    fn test_register_rejects_mismatched_handler() {
        let mut hooks = HookRegistry::new();
        let handler = HookHandler::List(Arc::new(|_: Process, _: &str| vec![1_i64]));
        assert_eq!(
            hooks.register_named("mymodule", "node_publish_process", handler),
            Err(HookError::SignatureMismatch {
                point: "node_publish_process".to_string()
            })
        );
        assert!(matches!(
            hooks.register_named(
                "mymodule",
                "bogus",
                HookHandler::List(Arc::new(|_: Process, _: &str| Vec::<ItemId>::new()))
            ),
            Err(HookError::UnknownPoint(_))
        ));
    }

    #[test]
    fn test_invocation_order_grouped_by_name() {
        let calls = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let record = |label: &'static str| {
            let calls = calls.clone();
            move |_: Process, _: &str| {
                calls.lock().unwrap().push(label);
                Vec::<ItemId>::new()
            }
        };

        let hooks = HookRegistry::new()
            .on_list("a", HookScope::Legacy, record("legacy"))
            .on_list("b", HookScope::EntityType("node".to_string()), record("node"))
            .on_list("c", HookScope::All, record("all-1"))
            .on_list("d", HookScope::All, record("all-2"));

        hooks.invoke_list(&node(), Process::Publish);
        assert_eq!(*calls.lock().unwrap(), vec!["all-1", "all-2", "node", "legacy"]);

        calls.lock().unwrap().clear();
        hooks.invoke_list(&media(), Process::Publish);
        assert_eq!(*calls.lock().unwrap(), vec!["all-1", "all-2"]);
    }

    #[test]
    fn test_implementation_names() {
        let hooks = HookRegistry::new()
            .on_list("extra", HookScope::All, |_: Process, _: &str| Vec::<ItemId>::new())
            .on_list("extra", HookScope::Legacy, |_: Process, _: &str| Vec::<ItemId>::new());
        assert_eq!(
            hooks.implementations(&node(), HookPoint::List),
            vec!["extra_scheduler_list", "extra_scheduler_nid_list"]
        );
        assert_eq!(
            hooks.implementations(&media(), HookPoint::List),
            vec!["extra_scheduler_list"]
        );
    }

    #[test]
    fn test_list_alter_mutates_in_place() {
        let hooks = HookRegistry::new().on_list_alter(
            "filter",
            HookScope::All,
            |ids: &mut Vec<ItemId>, _: Process, _: &str| ids.retain(|id| *id != 2),
        );
        let mut ids = vec![1, 2, 3];
        hooks.invoke_list_alter(&node(), &mut ids, Process::Unpublish);
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_allowed_tri_state() {
        let abstain = HookRegistry::new()
            .on_allowed("a", Process::Publish, HookScope::All, |_: &SchedulableItem| None::<bool>)
            .on_allowed("b", Process::Publish, HookScope::All, |_: &SchedulableItem| Some(true));
        assert!(abstain.is_allowed(&node(), Process::Publish, &item()));

        let deny = abstain.on_allowed(
            "c",
            Process::Publish,
            HookScope::Legacy,
            |_: &SchedulableItem| Some(false),
        );
        assert!(!deny.is_allowed(&node(), Process::Publish, &item()));
        // Legacy alias does not apply to media
        assert!(deny.is_allowed(&media(), Process::Publish, &item()));
        // Other process unaffected
        assert!(deny.is_allowed(&node(), Process::Unpublish, &item()));
    }

    #[test]
    fn test_process_failure_takes_precedence() {
        let hooks = HookRegistry::new()
            .on_process("a", Process::Publish, HookScope::All, |_: &mut SchedulableItem| {
                ProcessResult::Handled
            })
            .on_process("b", Process::Publish, HookScope::All, |_: &mut SchedulableItem| {
                ProcessResult::Failed
            });
        let mut item = item();
        let outcome = hooks.invoke_process(&node(), Process::Publish, &mut item);
        assert!(outcome.processed);
        assert!(outcome.failed);
        assert_eq!(
            outcome.implementations,
            vec!["a_scheduler_publish_process", "b_scheduler_publish_process"]
        );
    }

    #[test]
    fn test_process_without_callbacks() {
        let outcome = HookRegistry::new().invoke_process(&node(), Process::Unpublish, &mut item());
        assert_eq!(outcome, ProcessOutcome::default());
    }
}
