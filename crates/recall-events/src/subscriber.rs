use crate::events::Event;
use std::collections::HashSet;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionFilter {
    event_names: Option<HashSet<String>>,
    session_ids: Option<HashSet<String>>,
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.event_names = Some(names.into_iter().map(|s| s.into()).collect());
        self
    }

    pub fn session_ids(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.session_ids = Some(ids.into_iter().map(|s| s.into()).collect());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref names) = self.event_names {
            if !names.contains(event.event_name()) {
                return false;
            }
        }

        if let Some(ref ids) = self.session_ids {
            if !ids.contains(event.session_id()) {
                return false;
            }
        }

        true
    }

    pub fn is_wildcard(&self) -> bool {
        self.event_names.is_none() && self.session_ids.is_none()
    }
}

pub struct Subscriber {
    receiver: broadcast::Receiver<Event>,
    filter: SubscriptionFilter,
}

impl Subscriber {
    pub fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self {
            receiver,
            filter: SubscriptionFilter::new(),
        }
    }

    pub fn with_filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Subscriber lagged, missed {} events", n);
                    continue;
                }
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!("Subscriber lagged, missed {} events", n);
                    continue;
                }
            }
        }
    }
}
