//! Goal completion estimates and goal re-submission merge

use chrono::{Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{BudgetPlan, Goal, NewGoal};

/// How re-submitted goals pick up data from the goals they replace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalMergeStrategy {
    /// Match by goal id, then by case-insensitive name
    #[default]
    ByIdentity,
    /// Match by list position
    Positional,
}

impl std::str::FromStr for GoalMergeStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "by_identity" | "identity" => Ok(GoalMergeStrategy::ByIdentity),
            "positional" => Ok(GoalMergeStrategy::Positional),
            other => Err(Error::Config(format!("unknown goal merge strategy: {}", other))),
        }
    }
}

impl std::fmt::Display for GoalMergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoalMergeStrategy::ByIdentity => f.write_str("by_identity"),
            GoalMergeStrategy::Positional => f.write_str("positional"),
        }
    }
}

/// Set the top-priority goal's estimated completion date from the plan
///
/// Partial months round up, and the date is clamped to the end of the target
/// month. Only `goals[0]` is touched. Returns the new estimate, if any.
pub fn apply_estimate(goals: &mut [Goal], plan: &BudgetPlan, today: NaiveDate) -> Option<NaiveDate> {
    let months_needed = plan.goal_plan.as_ref()?.months_needed;
    if months_needed <= Decimal::ZERO {
        return None;
    }
    let top = goals.first_mut()?;
    let months = months_needed.ceil().to_u32()?;
    let estimate = today.checked_add_months(Months::new(months))?;
    top.estimated_date = Some(estimate);
    Some(estimate)
}

/// Turn submitted goals into stored goals, carrying over ids and estimates
pub fn merge_resubmitted(
    existing: &[Goal],
    submitted: Vec<NewGoal>,
    strategy: GoalMergeStrategy,
) -> Vec<Goal> {
    match strategy {
        GoalMergeStrategy::ByIdentity => merge_by_identity(existing, submitted),
        GoalMergeStrategy::Positional => merge_positional(existing, submitted),
    }
}

fn merge_by_identity(existing: &[Goal], submitted: Vec<NewGoal>) -> Vec<Goal> {
    let mut taken = vec![false; existing.len()];

    // Explicit ids claim their goals first so a name match cannot steal them
    let by_id: Vec<Option<usize>> = submitted
        .iter()
        .map(|goal| {
            let id = goal.id?;
            let idx = existing.iter().position(|g| g.id == id)?;
            if taken[idx] {
                return None;
            }
            taken[idx] = true;
            Some(idx)
        })
        .collect();

    submitted
        .into_iter()
        .zip(by_id)
        .map(|(goal, matched)| {
            let matched = matched.or_else(|| {
                if goal.id.is_some() {
                    return None;
                }
                let name = goal.name.trim().to_lowercase();
                let idx = existing
                    .iter()
                    .enumerate()
                    .position(|(i, g)| !taken[i] && g.name.trim().to_lowercase() == name)?;
                taken[idx] = true;
                Some(idx)
            });
            into_goal(goal, matched.map(|idx| &existing[idx]))
        })
        .collect()
}

fn merge_positional(existing: &[Goal], submitted: Vec<NewGoal>) -> Vec<Goal> {
    submitted
        .into_iter()
        .enumerate()
        .map(|(i, goal)| into_goal(goal, existing.get(i)))
        .collect()
}

fn into_goal(goal: NewGoal, previous: Option<&Goal>) -> Goal {
    let id = goal
        .id
        .or(previous.map(|g| g.id))
        .unwrap_or_else(Uuid::new_v4);
    let estimated_date = goal
        .estimated_date
        .or(previous.and_then(|g| g.estimated_date));
    Goal {
        id,
        name: goal.name.trim().to_string(),
        target_amount: goal.target_amount,
        deadline: goal.deadline,
        estimated_date,
    }
}
