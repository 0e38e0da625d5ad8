//! Compaction threshold checks

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenMonitor {
    threshold: f64,
}

impl TokenMonitor {
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn threshold_tokens(&self, budget: usize) -> f64 {
        budget as f64 * self.threshold
    }

    /// Compaction is needed once usage exceeds `budget * threshold`.
    pub fn needs_compaction(&self, current_tokens: usize, budget: usize) -> bool {
        current_tokens as f64 > self.threshold_tokens(budget)
    }

    pub fn usage_ratio(&self, current_tokens: usize, budget: usize) -> f64 {
        if budget == 0 {
            return 1.0;
        }
        current_tokens as f64 / budget as f64
    }
}

impl Default for TokenMonitor {
    fn default() -> Self {
        Self::new(0.8)
    }
}
