//! Token budget resolution

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tokens held back from a model-derived budget
pub const DEFAULT_SAFETY_MARGIN: usize = 1000;

/// Model limits reported by a budget source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub context_window: Option<usize>,
    #[serde(default)]
    pub max_output_tokens: Option<usize>,
}

impl ModelInfo {
    pub fn new(context_window: usize, max_output_tokens: usize) -> Self {
        Self {
            context_window: Some(context_window),
            max_output_tokens: Some(max_output_tokens),
        }
    }
}

/// Why a budget could not be derived from a budget source.
///
/// Always recovered by falling back to the configured default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetUnavailable {
    #[error("budget source failed: {0}")]
    Source(String),

    #[error("model info is missing {0}")]
    MissingField(&'static str),

    #[error("context window of {context_window} tokens leaves nothing after {reserved} reserved")]
    Exhausted {
        context_window: usize,
        reserved: usize,
    },
}

/// Supplies model limits for budget derivation
pub trait BudgetSource: Send + Sync {
    fn model_info(&self) -> Result<ModelInfo, BudgetUnavailable>;
}

impl BudgetSource for ModelInfo {
    fn model_info(&self) -> Result<ModelInfo, BudgetUnavailable> {
        Ok(*self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetOrigin {
    Explicit,
    Model,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBudget {
    pub tokens: usize,
    pub origin: BudgetOrigin,
}

/// Default budget and safety margin used during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetPolicy {
    pub default_budget: usize,
    pub safety_margin: usize,
}

impl BudgetPolicy {
    pub fn new(default_budget: usize) -> Self {
        Self {
            default_budget,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    pub fn with_safety_margin(mut self, safety_margin: usize) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Explicit budget wins, then the model-derived budget, then the default.
    pub fn resolve(
        &self,
        explicit: Option<usize>,
        source: Option<&dyn BudgetSource>,
    ) -> ResolvedBudget {
        if let Some(tokens) = explicit {
            return ResolvedBudget {
                tokens,
                origin: BudgetOrigin::Explicit,
            };
        }

        if let Some(source) = source {
            match source.model_info().and_then(|info| self.derive(&info)) {
                Ok(tokens) => {
                    return ResolvedBudget {
                        tokens,
                        origin: BudgetOrigin::Model,
                    }
                }
                Err(err) => {
                    tracing::debug!(
                        error = %err,
                        default_budget = self.default_budget,
                        "falling back to default budget"
                    );
                }
            }
        }

        ResolvedBudget {
            tokens: self.default_budget,
            origin: BudgetOrigin::Default,
        }
    }

    /// `context_window - max_output_tokens - safety_margin`
    pub fn derive(&self, info: &ModelInfo) -> Result<usize, BudgetUnavailable> {
        let context_window = info
            .context_window
            .ok_or(BudgetUnavailable::MissingField("context_window"))?;
        let max_output = info
            .max_output_tokens
            .ok_or(BudgetUnavailable::MissingField("max_output_tokens"))?;

        let reserved = max_output.saturating_add(self.safety_margin);
        match context_window.checked_sub(reserved) {
            Some(tokens) if tokens > 0 => Ok(tokens),
            _ => Err(BudgetUnavailable::Exhausted {
                context_window,
                reserved,
            }),
        }
    }
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self::new(100_000)
    }
}
