use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PRE_COMPACT: &str = "context:pre_compact";
pub const POST_COMPACT: &str = "context:post_compact";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // ============================================================================
    // Compaction Events
    // ============================================================================
    #[serde(rename = "context:pre_compact")]
    PreCompact {
        session_id: String,
        message_count: usize,
        token_count: usize,
    },
    #[serde(rename = "context:post_compact")]
    PostCompact {
        session_id: String,
        message_count: usize,
        token_count: usize,
        strategy: String,
        budget: usize,
    },
}

impl Event {
    pub fn session_id(&self) -> &str {
        match self {
            Self::PreCompact { session_id, .. } | Self::PostCompact { session_id, .. } => {
                session_id
            }
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PreCompact { .. } => PRE_COMPACT,
            Self::PostCompact { .. } => POST_COMPACT,
        }
    }

    /// Event fields as a flat mapping, without the `type` tag
    pub fn payload(&self) -> Map<String, Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.remove("type");
        map
    }
}
