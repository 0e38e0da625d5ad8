mod bus;
mod events;
mod sink;
mod subscriber;

pub use bus::BroadcastBus;
pub use events::{Event, POST_COMPACT, PRE_COMPACT};
pub use sink::{emit_guarded, CollectingSink, EventSink, NoopSink};
pub use subscriber::{Subscriber, SubscriptionFilter};
