//! Domain models for Fley

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ledger::SavingsLedger;

/// Store-assigned profile identifier
pub type ProfileId = i64;

/// Largest amount accepted for an allowance, expense, goal or spend (one trillion)
///
/// Keeps every sum the engine forms over a profile well inside `Decimal` range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

fn saturating_sum(amounts: impl Iterator<Item = Decimal>) -> Decimal {
    amounts.fold(Decimal::ZERO, |acc, amount| acc.saturating_add(amount))
}

/// Reject amounts above [`MAX_AMOUNT`]
pub(crate) fn ensure_within_limit(what: &str, amount: Decimal) -> Result<()> {
    if amount > MAX_AMOUNT {
        return Err(Error::Validation(format!(
            "{} of {} exceeds the limit of {}",
            what, amount, MAX_AMOUNT
        )));
    }
    Ok(())
}

/// Day of the month on which the allowance arrives (1-31)
///
/// Months shorter than the configured day use their last day instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct AllowanceDay(u32);

impl AllowanceDay {
    pub const FIRST: AllowanceDay = AllowanceDay(1);

    pub fn new(day: u32) -> Result<Self> {
        if (1..=31).contains(&day) {
            Ok(Self(day))
        } else {
            Err(Error::Validation(format!(
                "allowance day must be between 1 and 31, got {}",
                day
            )))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for AllowanceDay {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<u32> for AllowanceDay {
    type Error = Error;

    fn try_from(day: u32) -> Result<Self> {
        Self::new(day)
    }
}

impl From<AllowanceDay> for u32 {
    fn from(day: AllowanceDay) -> u32 {
        day.0
    }
}

impl std::str::FromStr for AllowanceDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let day: u32 = s
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("allowance day is not a number: {}", s)))?;
        Self::new(day)
    }
}

impl std::fmt::Display for AllowanceDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recurring monthly expense (rent, phone, transit pass)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub title: String,
    pub amount: Decimal,
}

/// A savings goal; list position is priority (index 0 is most important)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Stable identity, assigned once and carried across re-submissions
    pub id: Uuid,
    pub name: String,
    pub target_amount: Decimal,
    /// Date the user would like to reach the goal by (informational)
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    /// Projected completion date; only computed for the top-priority goal
    #[serde(default)]
    pub estimated_date: Option<NaiveDate>,
}

/// A goal as submitted during onboarding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    /// Identity of an existing goal this submission refers to
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    pub target_amount: Decimal,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub estimated_date: Option<NaiveDate>,
}

impl NewGoal {
    pub fn new(name: &str, target_amount: Decimal) -> Self {
        Self {
            name: name.to_string(),
            target_amount,
            ..Default::default()
        }
    }
}

/// An ad-hoc discretionary spend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableExpense {
    pub title: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Monthly split of the money left after recurring expenses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySplit {
    pub entertainment: Decimal,
    pub savings: Decimal,
}

impl MonthlySplit {
    /// Sum of both parts, or `None` if it does not fit in a `Decimal`
    pub fn total(&self) -> Option<Decimal> {
        self.entertainment.checked_add(self.savings)
    }
}

/// Savings allocation toward the highest-priority goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPlan {
    pub goal: String,
    pub monthly_saving: Decimal,
    pub months_needed: Decimal,
}

/// A validated budget plan as produced by the plan provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetPlan {
    pub monthly_split: MonthlySplit,
    /// Present when the user has goals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_plan: Option<GoalPlan>,
    /// Present when the user has no goals (e.g. "emergency fund")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub savings_purpose: Option<String>,
    #[serde(default)]
    pub discipline_rules: Vec<String>,
}

/// A user's finance profile, stored as a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceProfile {
    /// Assigned by the store; 0 until created
    #[serde(default)]
    pub id: ProfileId,
    pub name: String,
    /// Chat gateway identity linked to this profile
    #[serde(default)]
    pub external_link_id: Option<String>,
    /// Monthly allowance; zero means not yet provided
    #[serde(default)]
    pub allowance: Decimal,
    #[serde(default)]
    pub allowance_day: AllowanceDay,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    /// Remaining entertainment budget for the current period
    #[serde(default)]
    pub entertainment: Decimal,
    #[serde(default)]
    pub variable_expenses: Vec<VariableExpense>,
    #[serde(default)]
    pub savings_history: SavingsLedger,
    /// Last validated plan; cleared to force regeneration
    #[serde(default)]
    pub ai_plan: Option<BudgetPlan>,
    /// Overspend waiting for the ledger to open (defer policy only)
    #[serde(default)]
    pub deferred_deficit: Decimal,
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Optimistic concurrency counter, bumped by every successful save
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FinanceProfile {
    /// Create an empty, not yet stored profile
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            external_link_id: None,
            allowance: Decimal::ZERO,
            allowance_day: AllowanceDay::default(),
            expenses: Vec::new(),
            goals: Vec::new(),
            entertainment: Decimal::ZERO,
            variable_expenses: Vec::new(),
            savings_history: SavingsLedger::default(),
            ai_plan: None,
            deferred_deficit: Decimal::ZERO,
            onboarding_completed: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_expenses(&self) -> Decimal {
        saturating_sum(self.expenses.iter().map(|e| e.amount))
    }

    /// Allowance left after recurring expenses
    pub fn remaining_after_expenses(&self) -> Decimal {
        self.allowance.saturating_sub(self.total_expenses())
    }

    pub fn total_variable_expenses(&self) -> Decimal {
        saturating_sum(self.variable_expenses.iter().map(|e| e.amount))
    }

    /// Monthly savings accrual from the current plan, if any
    pub fn monthly_accrual(&self) -> Option<Decimal> {
        self.ai_plan.as_ref().map(|p| p.monthly_split.savings)
    }

    /// Headline figures shown by the chat gateway's balance and stats views
    pub fn summary(&self) -> ProfileSummary {
        let recurring_total = self.total_expenses();
        let variable_total = self.total_variable_expenses();
        ProfileSummary {
            profile_id: self.id,
            name: self.name.clone(),
            entertainment: self.entertainment,
            total_saved: self.savings_history.current_total(),
            recurring_total,
            recurring_count: self.expenses.len(),
            variable_total,
            total_spent: recurring_total.saturating_add(variable_total),
            goals: self.goals.clone(),
            has_plan: self.ai_plan.is_some(),
        }
    }
}

/// Onboarding submission: replaces expenses and goals, keeps the ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingInput {
    pub allowance: Decimal,
    #[serde(default)]
    pub allowance_day: AllowanceDay,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub goals: Vec<NewGoal>,
}

impl OnboardingInput {
    /// Reject negative amounts and nameless entries
    pub fn validate(&self) -> Result<()> {
        if self.allowance < Decimal::ZERO {
            return Err(Error::Validation("allowance cannot be negative".into()));
        }
        ensure_within_limit("allowance", self.allowance)?;
        for expense in &self.expenses {
            if expense.title.trim().is_empty() {
                return Err(Error::Validation("expense title is required".into()));
            }
            if expense.amount < Decimal::ZERO {
                return Err(Error::Validation(format!(
                    "expense '{}' has a negative amount",
                    expense.title
                )));
            }
            ensure_within_limit("expense amount", expense.amount)?;
        }
        for goal in &self.goals {
            if goal.name.trim().is_empty() {
                return Err(Error::Validation("goal name is required".into()));
            }
            if goal.target_amount <= Decimal::ZERO {
                return Err(Error::Validation(format!(
                    "goal '{}' needs a positive target amount",
                    goal.name
                )));
            }
            ensure_within_limit("goal target", goal.target_amount)?;
        }
        Ok(())
    }
}

/// Balance and spending overview for a profile
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub profile_id: ProfileId,
    pub name: String,
    pub entertainment: Decimal,
    pub total_saved: Decimal,
    pub recurring_total: Decimal,
    pub recurring_count: usize,
    pub variable_total: Decimal,
    pub total_spent: Decimal,
    pub goals: Vec<Goal>,
    pub has_plan: bool,
}
