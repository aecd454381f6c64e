//! Cost budget enforcement for agent tasks.
//!
//! Tracks cumulative LLM API spend for one task and fails the check once a
//! per-task ceiling is exceeded. One tracker per task; never shared.

use crate::domain::error::RunnerError;

/// Tracks cumulative cost and enforces a ceiling.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    /// Maximum allowed cost in USD. 0.0 (or negative) means unlimited.
    max_cost_usd: f64,
    spent: f64,
}

impl BudgetTracker {
    pub fn new(max_cost_usd: f64) -> Self {
        Self {
            max_cost_usd,
            spent: 0.0,
        }
    }

    /// Record a cost increment.
    pub fn record_cost(&mut self, cost_usd: f64) {
        self.spent += cost_usd;
    }

    /// Cumulative spend so far.
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// Remaining budget; `f64::INFINITY` when unlimited.
    pub fn remaining(&self) -> f64 {
        if self.max_cost_usd <= 0.0 {
            return f64::INFINITY;
        }
        (self.max_cost_usd - self.spent).max(0.0)
    }

    /// Fails with [`RunnerError::BudgetExceeded`] iff a ceiling is set and
    /// the spend has passed it.
    pub fn check(&self) -> Result<(), RunnerError> {
        if self.max_cost_usd > 0.0 && self.spent > self.max_cost_usd {
            tracing::warn!(
                spent = self.spent,
                limit = self.max_cost_usd,
                "budget.exceeded"
            );
            return Err(RunnerError::BudgetExceeded {
                spent: self.spent,
                limit: self.max_cost_usd,
            });
        }
        Ok(())
    }
}
