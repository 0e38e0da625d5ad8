use recall_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};

/// Main Recall configuration
///
/// Configuration is loaded from (in priority order):
/// 1. `recall.jsonc` - JSON with comments
/// 2. `recall.json` - Standard JSON
/// 3. `recall.yml` / `recall.yaml` - YAML format
///
/// Also checks hidden variants (`.recall.*`) and `~/.config/recall/` for global config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Context store settings
    #[serde(default)]
    pub context: ContextSettings,

    /// Logging settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

// ============================================================================
// Context Store Configuration
// ============================================================================

/// Context store settings
///
/// # Example
///
/// ```yaml
/// context:
///   default_budget: 100000
///   compaction_threshold: 0.8
///   safety_margin: 1000
///   strategy:
///     kind: summarize
///     keep_recent: 12
///   summarizer_timeout_secs: 30
///   transcript_dir: ${HOME}/.local/share/recall/sessions
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Budget used when no explicit budget or model info is available (default: 100000)
    #[serde(default = "default_budget")]
    pub default_budget: usize,

    /// Fraction of the budget that may be used before compaction (default: 0.8)
    #[serde(default = "default_compaction_threshold")]
    pub compaction_threshold: f64,

    /// Tokens subtracted from a model-derived budget (default: 1000)
    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,

    /// Compaction strategy (default: truncate)
    #[serde(default)]
    pub strategy: StrategySettings,

    /// Upper bound on a single summarizer call in seconds (default: 30)
    #[serde(default = "default_summarizer_timeout")]
    pub summarizer_timeout_secs: u64,

    /// Directory for persisted transcripts; in-memory only when unset
    #[serde(default)]
    pub transcript_dir: Option<String>,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            default_budget: default_budget(),
            compaction_threshold: default_compaction_threshold(),
            safety_margin: default_safety_margin(),
            strategy: StrategySettings::default(),
            summarizer_timeout_secs: default_summarizer_timeout(),
            transcript_dir: None,
        }
    }
}

fn default_budget() -> usize {
    100_000
}

fn default_compaction_threshold() -> f64 {
    0.8
}

fn default_safety_margin() -> usize {
    1000
}

fn default_summarizer_timeout() -> u64 {
    30
}

/// Serialized form of the compaction strategy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySettings {
    /// Keep system messages and the newest messages that fit
    #[default]
    Truncate,
    /// Replace older messages with a summary
    Summarize {
        #[serde(default)]
        keep_recent: Option<usize>,
    },
    /// Keep the highest scoring messages that fit
    Importance,
}
