//! Reasoning effort ↔ thinking budget conversion.
//!
//! Vendors disagree on which knob wins when a request carries both a
//! qualitative effort and a numeric budget. Anthropic and Gemini take the
//! budget as authoritative ([`ReasoningConfig::resolve_budget`]); OpenAI Chat
//! and Responses take the effort ([`ReasoningConfig::resolve_effort`]).

use serde::{Deserialize, Serialize};

use crate::canonical::ReasoningEffort;
use crate::errors::TransformError;

/// Budgets up to and including `max_budget` map to `effort`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetThreshold {
    pub max_budget: u32,
    pub effort: ReasoningEffort,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct EffortBudgets {
    pub minimal: u32,
    pub low: u32,
    pub medium: u32,
    pub high: u32,
}

impl Default for EffortBudgets {
    fn default() -> Self {
        EffortBudgets {
            minimal: 1024,
            low: 5000,
            medium: 15000,
            high: 30000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Ordered by strictly increasing `max_budget`.
    pub budget_thresholds: Vec<BudgetThreshold>,
    /// Effort for budgets above the last threshold.
    pub above_threshold_effort: ReasoningEffort,
    pub effort_budgets: EffortBudgets,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        ReasoningConfig {
            budget_thresholds: vec![
                BudgetThreshold {
                    max_budget: 5000,
                    effort: ReasoningEffort::Low,
                },
                BudgetThreshold {
                    max_budget: 15000,
                    effort: ReasoningEffort::Medium,
                },
            ],
            above_threshold_effort: ReasoningEffort::High,
            effort_budgets: EffortBudgets::default(),
        }
    }
}

impl ReasoningConfig {
    pub fn effort_for_budget(&self, budget: u32) -> ReasoningEffort {
        self.budget_thresholds
            .iter()
            .find(|t| budget <= t.max_budget)
            .map(|t| t.effort)
            .unwrap_or(self.above_threshold_effort)
    }

    pub fn budget_for_effort(&self, effort: ReasoningEffort) -> u32 {
        match effort {
            ReasoningEffort::Minimal => self.effort_budgets.minimal,
            ReasoningEffort::Low => self.effort_budgets.low,
            ReasoningEffort::Medium => self.effort_budgets.medium,
            ReasoningEffort::High => self.effort_budgets.high,
        }
    }

    /// Budget-first: an explicit budget wins over the effort label. A zero
    /// budget is kept; it means thinking is switched off.
    pub fn resolve_budget(
        &self,
        budget: Option<u32>,
        effort: Option<ReasoningEffort>,
    ) -> Option<u32> {
        budget.or_else(|| effort.map(|e| self.budget_for_effort(e)))
    }

    /// Effort-first: an explicit effort label wins over the budget. A zero
    /// budget has no effort equivalent and leaves the vendor default.
    pub fn resolve_effort(
        &self,
        effort: Option<ReasoningEffort>,
        budget: Option<u32>,
    ) -> Option<ReasoningEffort> {
        effort.or_else(|| {
            budget
                .filter(|b| *b > 0)
                .map(|b| self.effort_for_budget(b))
        })
    }

    /// Both tables must be monotonic.
    pub fn validate(&self) -> Result<(), TransformError> {
        for pair in self.budget_thresholds.windows(2) {
            if pair[1].max_budget <= pair[0].max_budget {
                return Err(TransformError::InvalidRequest(format!(
                    "reasoning budget thresholds must strictly increase ({} then {})",
                    pair[0].max_budget, pair[1].max_budget
                )));
            }
            if pair[1].effort < pair[0].effort {
                return Err(TransformError::InvalidRequest(format!(
                    "reasoning effort must not decrease as budget grows ({} then {})",
                    pair[0].effort, pair[1].effort
                )));
            }
        }
        if let Some(last) = self.budget_thresholds.last() {
            if self.above_threshold_effort < last.effort {
                return Err(TransformError::InvalidRequest(
                    "above_threshold_effort is lower than the last bucket".to_string(),
                ));
            }
        }
        let b = &self.effort_budgets;
        if !(b.minimal <= b.low && b.low <= b.medium && b.medium <= b.high) {
            return Err(TransformError::InvalidRequest(
                "effort budgets must not decrease from minimal to high".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buckets() {
        let config = ReasoningConfig::default();
        assert_eq!(config.effort_for_budget(0), ReasoningEffort::Low);
        assert_eq!(config.effort_for_budget(5000), ReasoningEffort::Low);
        assert_eq!(config.effort_for_budget(5001), ReasoningEffort::Medium);
        assert_eq!(config.effort_for_budget(15000), ReasoningEffort::Medium);
        assert_eq!(config.effort_for_budget(15001), ReasoningEffort::High);
        assert_eq!(config.effort_for_budget(u32::MAX), ReasoningEffort::High);
    }

    #[test]
    fn test_priority_asymmetry() {
        let config = ReasoningConfig::default();

        // Budget-first direction keeps the explicit budget.
        assert_eq!(
            config.resolve_budget(Some(20000), Some(ReasoningEffort::Low)),
            Some(20000)
        );
        assert_eq!(config.resolve_budget(None, Some(ReasoningEffort::Medium)), Some(15000));

        // Effort-first direction keeps the explicit effort.
        assert_eq!(
            config.resolve_effort(Some(ReasoningEffort::Low), Some(20000)),
            Some(ReasoningEffort::Low)
        );
        assert_eq!(config.resolve_effort(None, Some(20000)), Some(ReasoningEffort::High));
        assert_eq!(config.resolve_effort(None, None), None);
    }

    #[test]
    fn test_zero_budget_means_thinking_off() {
        let config = ReasoningConfig::default();
        assert_eq!(config.resolve_budget(Some(0), Some(ReasoningEffort::High)), Some(0));
        assert_eq!(config.resolve_effort(None, Some(0)), None);
        assert_eq!(
            config.resolve_effort(Some(ReasoningEffort::Low), Some(0)),
            Some(ReasoningEffort::Low)
        );
    }

    #[test]
    fn test_validate_rejects_non_monotonic_table() {
        let mut config = ReasoningConfig::default();
        assert!(config.validate().is_ok());

        config.budget_thresholds[1].max_budget = 4000;
        assert!(matches!(
            config.validate(),
            Err(TransformError::InvalidRequest(_))
        ));

        let mut config = ReasoningConfig::default();
        config.effort_budgets.low = 50000;
        assert!(config.validate().is_err());
    }
}
