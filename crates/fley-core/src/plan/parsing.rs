//! Parsing and validation of provider plan responses
//!
//! Providers often wrap the JSON in a ```json fence or add prose around it.

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::models::{BudgetPlan, MonthlySplit};

/// Remove code fences and any text outside the outermost JSON object
pub fn strip_fences(response: &str) -> &str {
    let trimmed = response.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim(),
    }
}

/// Parse a provider response into a plan
pub fn parse_plan(response: &str) -> Result<BudgetPlan> {
    let json_str = strip_fences(response);
    if !json_str.starts_with('{') {
        return Err(Error::InvalidPlanFormat(format!(
            "no JSON object in response | Raw: {}",
            truncate(response.trim())
        )));
    }
    serde_json::from_str(json_str).map_err(|e| {
        Error::InvalidPlanFormat(format!("{} | Raw: {}", e, truncate(json_str)))
    })
}

/// Check the split against the money left after expenses
///
/// The comparison is exact; both parts must also be non-negative.
pub fn validate_split(split: &MonthlySplit, remaining: Decimal) -> Result<()> {
    let invalid = || Error::InvalidPlanArithmetic {
        entertainment: split.entertainment,
        savings: split.savings,
        remaining,
    };
    if split.entertainment < Decimal::ZERO || split.savings < Decimal::ZERO {
        return Err(invalid());
    }
    if split.total() != Some(remaining) {
        return Err(invalid());
    }
    Ok(())
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
