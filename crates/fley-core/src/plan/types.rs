//! Request and result types for plan generation

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{BudgetPlan, FinanceProfile};

/// Recurring expense as sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseLine {
    pub name: String,
    pub amount: Decimal,
}

/// Goal as sent to the provider; priority 1 is the most important
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoalLine {
    pub priority: usize,
    pub name: String,
    pub amount: Decimal,
}

/// Everything the provider is told about a profile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub allowance: Decimal,
    pub total_expenses: Decimal,
    pub remaining: Decimal,
    pub expenses: Vec<ExpenseLine>,
    pub goals: Vec<GoalLine>,
}

impl PlanRequest {
    /// Build the request from a profile; amounts are not validated here
    pub fn from_profile(profile: &FinanceProfile) -> Self {
        let total_expenses = profile.total_expenses();
        Self {
            allowance: profile.allowance,
            total_expenses,
            remaining: profile.allowance.saturating_sub(total_expenses),
            expenses: profile
                .expenses
                .iter()
                .map(|e| ExpenseLine {
                    name: e.title.clone(),
                    amount: e.amount,
                })
                .collect(),
            goals: profile
                .goals
                .iter()
                .enumerate()
                .map(|(i, g)| GoalLine {
                    priority: i + 1,
                    name: g.name.clone(),
                    amount: g.target_amount,
                })
                .collect(),
        }
    }

    pub fn has_goals(&self) -> bool {
        !self.goals.is_empty()
    }

    /// Template variables for the `budget_plan` prompt
    ///
    /// `goals` is empty when there are none, which selects the no-goal rules.
    pub fn prompt_vars(&self) -> HashMap<&'static str, String> {
        let expenses = if self.expenses.is_empty() {
            "(none)".to_string()
        } else {
            self.expenses
                .iter()
                .map(|e| format!("- {}: {}", e.name, e.amount))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let goals = self
            .goals
            .iter()
            .map(|g| format!("- Priority {}: {} ({})", g.priority, g.name, g.amount))
            .collect::<Vec<_>>()
            .join("\n");

        HashMap::from([
            ("allowance", self.allowance.to_string()),
            ("total_expenses", self.total_expenses.to_string()),
            ("remaining", self.remaining.to_string()),
            ("expenses", expenses),
            ("goals", goals),
        ])
    }
}

/// A provider plan that passed validation, with the figures it was checked against
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedPlan {
    pub plan: BudgetPlan,
    pub total_expenses: Decimal,
    pub remaining: Decimal,
}
