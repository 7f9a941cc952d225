// Pre/post transition notifications

use crate::models::{Process, SchedulableItem};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerEventKind {
    PrePublish,
    Publish,
    PreUnpublish,
    Unpublish,
}

impl SchedulerEventKind {
    pub fn pre(process: Process) -> Self {
        match process {
            Process::Publish => SchedulerEventKind::PrePublish,
            Process::Unpublish => SchedulerEventKind::PreUnpublish,
        }
    }

    pub fn post(process: Process) -> Self {
        match process {
            Process::Publish => SchedulerEventKind::Publish,
            Process::Unpublish => SchedulerEventKind::Unpublish,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            SchedulerEventKind::PrePublish => "PRE_PUBLISH",
            SchedulerEventKind::Publish => "PUBLISH",
            SchedulerEventKind::PreUnpublish => "PRE_UNPUBLISH",
            SchedulerEventKind::Unpublish => "UNPUBLISH",
        }
    }

    /// Dispatched name, e.g. `scheduler.media.pre_publish`
    pub fn event_name(self, topic: &str) -> String {
        format!("{}.{}", topic, self.id().to_ascii_lowercase())
    }
}

impl fmt::Display for SchedulerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Event payload; subscribers may alter or replace the item
#[derive(Debug)]
pub struct SchedulerEvent {
    kind: SchedulerEventKind,
    name: String,
    item: SchedulableItem,
}

impl SchedulerEvent {
    pub fn kind(&self) -> SchedulerEventKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item(&self) -> &SchedulableItem {
        &self.item
    }

    pub fn item_mut(&mut self) -> &mut SchedulableItem {
        &mut self.item
    }

    pub fn set_item(&mut self, item: SchedulableItem) {
        self.item = item;
    }

    pub fn into_item(self) -> SchedulableItem {
        self.item
    }
}

pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &mut SchedulerEvent);
}

impl<F> EventSubscriber for F
where
    F: Fn(&mut SchedulerEvent) + Send + Sync,
{
    fn on_event(&self, event: &mut SchedulerEvent) {
        self(event)
    }
}

/// Synchronous in-process dispatcher, registration order
#[derive(Default, Clone)]
pub struct EventDispatcher {
    subscribers: Vec<(Option<SchedulerEventKind>, Arc<dyn EventSubscriber>)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<S: EventSubscriber + 'static>(
        mut self,
        kind: SchedulerEventKind,
        subscriber: S,
    ) -> Self {
        self.subscribers.push((Some(kind), Arc::new(subscriber)));
        self
    }

    /// Receive every event kind
    pub fn subscribe_all<S: EventSubscriber + 'static>(mut self, subscriber: S) -> Self {
        self.subscribers.push((None, Arc::new(subscriber)));
        self
    }

    /// Dispatch and hand back the possibly altered item
    pub fn dispatch(
        &self,
        kind: SchedulerEventKind,
        topic: &str,
        item: SchedulableItem,
    ) -> SchedulableItem {
        let mut event = SchedulerEvent {
            kind,
            name: kind.event_name(topic),
            item,
        };
        for (filter, subscriber) in &self.subscribers {
            if filter.map_or(true, |k| k == kind) {
                subscriber.on_event(&mut event);
            }
        }
        trace!(event = %event.name, id = event.item.id(), "Event dispatched");
        event.into_item()
    }
}
