pub mod loader;
pub mod schema;

pub use loader::{
    find_all_config_files, load_config, load_config_from_file, resolve_config, ConfigFormat,
    ResolvedConfig,
};
pub use schema::{ContextSettings, RecallConfig, StrategySettings};
pub use recall_telemetry::TelemetryConfig;
