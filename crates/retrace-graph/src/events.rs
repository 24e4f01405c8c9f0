//! Graph events
//!
//! Notifications for UI and other observers. They are not part of the
//! execution contract: a lagging or absent subscriber never blocks the
//! engine.

use retrace_model::{ActionId, ObjectId, StateId, StoryId};
use tokio::sync::broadcast;

/// Event emitted by a provenance graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// The current state moved
    StateChanged {
        /// Previous current state
        old: StateId,
        /// New current state
        new: StateId,
    },
    /// An action and its result state were appended
    ActionAdded {
        /// New action
        action: ActionId,
        /// State it was applied from
        from: StateId,
        /// New result state
        to: StateId,
    },
    /// An executor ran, during push or replay
    Executed {
        /// Action the run belongs to
        action: ActionId,
        /// True when the inverse ran
        inverse: bool,
    },
    /// An object was created by an action
    ObjectAdded {
        /// New object
        object: ObjectId,
    },
    /// A persist started
    SyncStart,
    /// A persist finished
    Sync,
    /// The graph was reset to a fresh root
    Cleared {
        /// New root
        root: StateId,
    },
    /// The graph was rebuilt from a dump
    Restored {
        /// Restored current state
        current: StateId,
    },
    /// A story was added
    StoryAdded {
        /// New story
        story: StoryId,
    },
    /// A story was removed
    StoryRemoved {
        /// Removed story
        story: StoryId,
    },
    /// Slides of a story were edited
    StoryChanged {
        /// Edited story
        story: StoryId,
    },
    /// A branch was copied onto another state
    Forked {
        /// First action of the copied branch
        action: ActionId,
        /// State the copy hangs off
        target: StateId,
    },
}

/// Broadcast channel for graph events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GraphEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event
    pub fn publish(&self, event: GraphEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(GraphEvent::SyncStart);
        bus.publish(GraphEvent::Sync);
        assert_eq!(rx.recv().await.unwrap(), GraphEvent::SyncStart);
        assert_eq!(rx.recv().await.unwrap(), GraphEvent::Sync);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new(0);
        bus.publish(GraphEvent::Sync);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
