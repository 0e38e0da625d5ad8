use serde::{Deserialize, Serialize};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json_output: bool,

    /// Include span close events with timings
    #[serde(default)]
    pub log_spans: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_output: false,
            log_spans: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// `RUST_LOG` wins over the configured level.
pub fn build_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

pub fn init_subscriber(config: &TelemetryConfig) {
    if let Err(err) = try_init_subscriber(config) {
        eprintln!("tracing subscriber already installed: {err}");
    }
}

pub fn try_init_subscriber(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let filter = build_filter(config);
    let span_events = if config.log_spans {
        fmt::format::FmtSpan::CLOSE
    } else {
        fmt::format::FmtSpan::NONE
    };

    if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_span_events(span_events))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_span_events(span_events))
            .try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_output);
        assert!(!config.log_spans);
    }

    #[test]
    fn test_config_defaults_when_fields_missing() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"json_output": true}"#).unwrap();
        assert_eq!(config.level, "info");
        assert!(config.json_output);
    }

    #[test]
    fn test_second_init_reports_error() {
        let config = TelemetryConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        let _ = try_init_subscriber(&config);
        assert!(try_init_subscriber(&config).is_err());
    }
}
