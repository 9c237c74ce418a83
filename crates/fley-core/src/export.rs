//! CSV export of the savings ledger and variable expenses

use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::Result;
use crate::models::FinanceProfile;

#[derive(Debug, Serialize)]
struct LedgerRow {
    date: NaiveDate,
    total: Decimal,
    change: Decimal,
}

#[derive(Debug, Serialize)]
struct SpendRow<'a> {
    timestamp: DateTime<Utc>,
    title: &'a str,
    amount: Decimal,
}

/// Write one row per savings checkpoint with the change from the previous one
pub fn export_ledger<W: Write>(profile: &FinanceProfile, out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    let mut previous = Decimal::ZERO;
    let checkpoints = profile.savings_history.checkpoints();
    for checkpoint in checkpoints {
        writer.serialize(LedgerRow {
            date: checkpoint.date,
            total: checkpoint.amount,
            change: checkpoint.amount.saturating_sub(previous),
        })?;
        previous = checkpoint.amount;
    }
    writer.flush()?;
    Ok(checkpoints.len())
}

/// Write every recorded spend in the order it happened
pub fn export_spends<W: Write>(profile: &FinanceProfile, out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    for spend in &profile.variable_expenses {
        writer.serialize(SpendRow {
            timestamp: spend.timestamp,
            title: &spend.title,
            amount: spend.amount,
        })?;
    }
    writer.flush()?;
    Ok(profile.variable_expenses.len())
}
