// Scheduled-transition engine

pub mod actions;
pub mod engine;
pub mod events;
pub mod hooks;
pub mod registry;
pub mod report;
pub mod selector;
pub mod transition;

pub use actions::{ActionRegistry, EntityAction, ModerationStateAction, SetStatusAction};
pub use engine::SchedulerManager;
pub use events::{EventDispatcher, EventSubscriber, SchedulerEvent, SchedulerEventKind};
pub use hooks::{HookHandler, HookPoint, HookRegistry, HookScope, ProcessOutcome, ProcessResult};
pub use registry::{
    CapabilityDescriptor, MediaScheduler, NodeScheduler, PluginRegistry, SchedulerPlugin,
};
pub use report::{CronReport, ItemOutcome, PassReport};
pub use transition::{Transition, TransitionContext, TransitionState};
