//! Event bus and the publisher the bridge uses to feed it.

use std::{fmt, sync::Arc};

use {
    tokio::sync::broadcast,
    tracing::{debug, trace},
};

use crate::events::{
    BridgeEvent, FriendRequestEvent, GroupRequestEvent, InstanceStatus, InstanceStatusEvent,
    MessageEvent, NoticeEvent,
};

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast fan-out of [`BridgeEvent`]s to every subscribed plugin.
///
/// Slow subscribers lag and drop events; they never block the publisher.
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: BridgeEvent) {
        let kind = event.kind();
        let instance_id = event.instance_id();
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(kind, instance_id, receivers, "event published");
            },
            Err(_) => trace!(kind, instance_id, "event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheap, cloneable front door to the [`EventBus`].
///
/// Every `publish_*` call is fire-and-forget: nothing is returned and
/// nothing a subscriber does can make it fail.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<EventBus>,
}

impl EventPublisher {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus: Arc::new(bus),
        }
    }

    pub fn publish_message(&self, event: MessageEvent) {
        self.bus.publish(BridgeEvent::Message(event));
    }

    pub fn publish_friend_request(&self, event: FriendRequestEvent) {
        self.bus.publish(BridgeEvent::FriendRequest(event));
    }

    pub fn publish_group_request(&self, event: GroupRequestEvent) {
        self.bus.publish(BridgeEvent::GroupRequest(event));
    }

    pub fn publish_notice(&self, event: NoticeEvent) {
        self.bus.publish(BridgeEvent::Notice(event));
    }

    pub fn publish_instance_status(
        &self,
        instance_id: i64,
        status: InstanceStatus,
        error: Option<String>,
    ) {
        self.bus
            .publish(BridgeEvent::InstanceStatus(InstanceStatusEvent {
                instance_id,
                status,
                error,
            }));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.bus.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(EventBus::new())
    }
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
