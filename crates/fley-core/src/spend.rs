//! Spend processing against the entertainment sub-budget
//!
//! Spending beyond the entertainment balance is taken out of savings: the
//! overflow reduces the latest ledger checkpoint and entertainment is clamped
//! to zero. What happens when there is no checkpoint yet is a [`DeficitPolicy`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{ensure_within_limit, FinanceProfile, VariableExpense};

/// Handling of an overspend when the savings ledger has no checkpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeficitPolicy {
    /// The deficit has no effect beyond zeroing entertainment
    #[default]
    Discard,
    /// Open the ledger with a negative checkpoint dated at the spend
    NegativeCheckpoint,
    /// Carry the deficit until the ledger is first seeded
    Defer,
    /// Fail the spend without changing anything
    Reject,
}

impl DeficitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeficitPolicy::Discard => "discard",
            DeficitPolicy::NegativeCheckpoint => "negative_checkpoint",
            DeficitPolicy::Defer => "defer",
            DeficitPolicy::Reject => "reject",
        }
    }
}

impl std::str::FromStr for DeficitPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "discard" => Ok(DeficitPolicy::Discard),
            "negative_checkpoint" => Ok(DeficitPolicy::NegativeCheckpoint),
            "defer" => Ok(DeficitPolicy::Defer),
            "reject" => Ok(DeficitPolicy::Reject),
            other => Err(Error::Config(format!("unknown deficit policy: {}", other))),
        }
    }
}

impl std::fmt::Display for DeficitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Balances after a spend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendOutcome {
    pub entertainment: Decimal,
    pub savings_total: Decimal,
    /// Part of the overspend taken out of savings
    pub absorbed: Decimal,
    /// Part of the overspend that had nowhere to go (discarded or deferred)
    pub unabsorbed: Decimal,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpendProcessor {
    policy: DeficitPolicy,
}

impl SpendProcessor {
    pub fn new(policy: DeficitPolicy) -> Self {
        Self { policy }
    }

    /// Record a spend and rebalance entertainment and savings
    ///
    /// The profile is only modified when this returns `Ok`.
    pub fn apply_spend(
        &self,
        profile: &mut FinanceProfile,
        amount: Decimal,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<SpendOutcome> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "spend amount must be positive, got {}",
                amount
            )));
        }
        ensure_within_limit("spend amount", amount)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("spend title is required".into()));
        }

        let balance = profile
            .entertainment
            .checked_sub(amount)
            .ok_or_else(|| Error::Validation("entertainment balance overflowed".into()))?;
        let deficit = if balance < Decimal::ZERO {
            -balance
        } else {
            Decimal::ZERO
        };

        let ledger_empty = profile.savings_history.is_empty();
        if deficit > Decimal::ZERO && ledger_empty && self.policy == DeficitPolicy::Reject {
            return Err(Error::UnabsorbedDeficit(deficit));
        }

        profile.variable_expenses.push(VariableExpense {
            title: title.to_string(),
            amount,
            timestamp: at,
        });

        let mut absorbed = Decimal::ZERO;
        let mut unabsorbed = Decimal::ZERO;
        if deficit > Decimal::ZERO {
            if profile.savings_history.absorb_deficit(deficit) {
                absorbed = deficit;
            } else {
                match self.policy {
                    DeficitPolicy::NegativeCheckpoint => {
                        profile.savings_history.seed(at.date_naive(), -deficit);
                        absorbed = deficit;
                    }
                    DeficitPolicy::Defer => {
                        profile.deferred_deficit = profile.deferred_deficit.saturating_add(deficit);
                        unabsorbed = deficit;
                    }
                    DeficitPolicy::Discard | DeficitPolicy::Reject => {
                        unabsorbed = deficit;
                    }
                }
            }
            debug!(
                profile_id = profile.id,
                %deficit,
                %absorbed,
                policy = %self.policy,
                "Overspend moved out of entertainment"
            );
        }
        profile.entertainment = balance.max(Decimal::ZERO);

        Ok(SpendOutcome {
            entertainment: profile.entertainment,
            savings_total: profile.savings_history.current_total(),
            absorbed,
            unabsorbed,
        })
    }
}
