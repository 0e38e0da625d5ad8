mod subscriber;

pub use subscriber::{build_filter, init_subscriber, try_init_subscriber, TelemetryConfig};
