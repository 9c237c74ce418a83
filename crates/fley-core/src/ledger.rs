//! Savings ledger: running-total checkpoints caught up to the present on read
//!
//! Each checkpoint records the cumulative amount saved as of its date. Catch-up
//! appends one checkpoint per allowance date that has passed since the last
//! one, so a profile that was not read for months accrues every missed period
//! in one pass.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::AllowanceDay;

/// A running-total savings checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsCheckpoint {
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// What a catch-up pass did to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUpOutcome {
    /// Ledger was empty and got its first checkpoint
    Initialized,
    /// This many allowance periods were appended
    Appended(usize),
    Unchanged,
}

impl CatchUpOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, CatchUpOutcome::Unchanged)
    }
}

/// Date-ascending sequence of savings checkpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SavingsCheckpoint>", into = "Vec<SavingsCheckpoint>")]
pub struct SavingsLedger(Vec<SavingsCheckpoint>);

impl TryFrom<Vec<SavingsCheckpoint>> for SavingsLedger {
    type Error = Error;

    fn try_from(checkpoints: Vec<SavingsCheckpoint>) -> Result<Self> {
        Self::from_checkpoints(checkpoints)
    }
}

impl From<SavingsLedger> for Vec<SavingsCheckpoint> {
    fn from(ledger: SavingsLedger) -> Self {
        ledger.0
    }
}

impl SavingsLedger {
    /// Build a ledger from existing checkpoints, rejecting out-of-order dates
    pub fn from_checkpoints(checkpoints: Vec<SavingsCheckpoint>) -> Result<Self> {
        if checkpoints.windows(2).any(|w| w[0].date >= w[1].date) {
            return Err(Error::Validation(
                "savings checkpoints must have strictly increasing dates".into(),
            ));
        }
        Ok(Self(checkpoints))
    }

    pub fn checkpoints(&self) -> &[SavingsCheckpoint] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn last(&self) -> Option<&SavingsCheckpoint> {
        self.0.last()
    }

    /// Amount of the last checkpoint, or zero for an empty ledger
    pub fn current_total(&self) -> Decimal {
        self.0.last().map(|c| c.amount).unwrap_or(Decimal::ZERO)
    }

    /// Bring the ledger up to `today`
    ///
    /// An empty ledger is opened with a single checkpoint dated `today` holding
    /// one accrual. Otherwise every allowance date after the last checkpoint
    /// and on or before `today` gets a checkpoint of `previous + accrual`.
    /// Calling this again with the same `today` is a no-op. On error the
    /// ledger is left as it was.
    pub fn catch_up(
        &mut self,
        allowance_day: AllowanceDay,
        monthly_accrual: Decimal,
        today: NaiveDate,
    ) -> Result<CatchUpOutcome> {
        let Some(last) = self.0.last().copied() else {
            self.0.push(SavingsCheckpoint {
                date: today,
                amount: monthly_accrual,
            });
            return Ok(CatchUpOutcome::Initialized);
        };

        let mut pending = Vec::new();
        let mut cursor = last;
        loop {
            let next = next_allowance_date(cursor.date, allowance_day).ok_or_else(|| {
                Error::Validation(format!(
                    "cannot compute the allowance date after {}",
                    cursor.date
                ))
            })?;
            if next > today {
                break;
            }
            let amount = cursor
                .amount
                .checked_add(monthly_accrual)
                .ok_or_else(|| Error::Validation("savings total overflowed".into()))?;
            cursor = SavingsCheckpoint { date: next, amount };
            pending.push(cursor);
        }

        if pending.is_empty() {
            return Ok(CatchUpOutcome::Unchanged);
        }
        let appended = pending.len();
        self.0.extend(pending);
        Ok(CatchUpOutcome::Appended(appended))
    }

    /// Reduce the last checkpoint by `deficit`
    ///
    /// This is a correction of the latest total, not a new dated entry.
    /// Returns false when the ledger is empty and nothing was absorbed.
    pub fn absorb_deficit(&mut self, deficit: Decimal) -> bool {
        match self.0.last_mut() {
            Some(last) => {
                last.amount = last.amount.saturating_sub(deficit);
                true
            }
            None => false,
        }
    }

    /// Open an empty ledger with a first checkpoint
    ///
    /// Returns false (and changes nothing) if the ledger already has entries.
    pub fn seed(&mut self, date: NaiveDate, amount: Decimal) -> bool {
        if !self.0.is_empty() {
            return false;
        }
        self.0.push(SavingsCheckpoint { date, amount });
        true
    }

    /// Illustrative savings curve; never persisted
    pub fn projected(monthly_accrual: Decimal, horizon_months: u32, from: NaiveDate) -> Projection {
        Projection {
            monthly_accrual,
            horizon_months,
            from,
        }
    }
}

/// Allowance date in the calendar month following `after`
///
/// The day is clamped to the length of that month, and only the month of
/// `after` matters, so a day-31 allowance goes Jan 31, Feb 29, Mar 31 without
/// drifting.
pub fn next_allowance_date(after: NaiveDate, day: AllowanceDay) -> Option<NaiveDate> {
    let next_month = after.with_day(1)?.checked_add_months(Months::new(1))?;
    allowance_date_in_month(next_month.year(), next_month.month(), day)
}

fn allowance_date_in_month(year: i32, month: u32, day: AllowanceDay) -> Option<NaiveDate> {
    (1..=day.get())
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
}

/// One point of a savings projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedPoint {
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// Lazy projection of `accrual * i` at `from + i` months for `i` in `0..=horizon`
///
/// Holds no points itself; every call to [`Projection::iter`] starts over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    monthly_accrual: Decimal,
    horizon_months: u32,
    from: NaiveDate,
}

impl Projection {
    pub fn iter(&self) -> impl Iterator<Item = ProjectedPoint> + '_ {
        (0..=self.horizon_months).map_while(move |i| {
            let date = self.from.checked_add_months(Months::new(i))?;
            Some(ProjectedPoint {
                date,
                amount: self.monthly_accrual.checked_mul(Decimal::from(i))?,
            })
        })
    }

    pub fn horizon_months(&self) -> u32 {
        self.horizon_months
    }
}

impl<'a> IntoIterator for &'a Projection {
    type Item = ProjectedPoint;
    type IntoIter = Box<dyn Iterator<Item = ProjectedPoint> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
