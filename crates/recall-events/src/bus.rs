use tokio::sync::broadcast;

use crate::{Event, EventSink, Subscriber};

const DEFAULT_CAPACITY: usize = 256;

/// Event sink fanning out to any number of async subscribers
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<Event>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscriber {
        Subscriber::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastBus {
    fn emit(&self, event: &Event) {
        // No subscribers is not an error for a fire-and-forget sink
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!(event = event.event_name(), "no subscribers for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SubscriptionFilter;

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = BroadcastBus::new();
        let mut subscriber = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(&Event::PreCompact {
            session_id: "ses_1".to_string(),
            message_count: 4,
            token_count: 40,
        });

        let event = subscriber.recv().await.unwrap();
        assert_eq!(event.event_name(), "context:pre_compact");
    }

    #[tokio::test]
    async fn test_bus_without_subscribers_is_silent() {
        let bus = BroadcastBus::new();
        bus.emit(&Event::PreCompact {
            session_id: "ses_1".to_string(),
            message_count: 4,
            token_count: 40,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_filtered_subscriber() {
        let bus = BroadcastBus::new();
        let mut subscriber = bus
            .subscribe()
            .with_filter(SubscriptionFilter::new().event_names(["context:post_compact"]));

        bus.emit(&Event::PreCompact {
            session_id: "ses_1".to_string(),
            message_count: 4,
            token_count: 40,
        });
        bus.emit(&Event::PostCompact {
            session_id: "ses_1".to_string(),
            message_count: 2,
            token_count: 20,
            strategy: "truncate".to_string(),
            budget: 30,
        });

        let event = subscriber.try_recv().unwrap();
        assert_eq!(event.event_name(), "context:post_compact");
        assert!(subscriber.try_recv().is_none());
    }
}
