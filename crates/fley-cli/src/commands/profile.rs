//! Profile command implementations (onboard, profile, link)

use anyhow::{anyhow, bail, Context, Result};
use fley_core::{
    db::Database, AllowanceDay, EngineConfig, Expense, FinanceProfile, NewGoal, OnboardingInput,
    ProfileId,
};
use rust_decimal::Decimal;

use super::{money, offline_engine, Target};

/// Parse a `Name=Amount` argument
///
/// Splits on the last `=` so names may contain one.
pub fn parse_named_amount(raw: &str) -> Result<(String, Decimal)> {
    let (name, amount) = raw
        .rsplit_once('=')
        .ok_or_else(|| anyhow!("Expected Name=Amount, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("Missing name in '{}'", raw);
    }
    let amount: Decimal = amount
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount in '{}'", raw))?;
    Ok((name.to_string(), amount))
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_onboard(
    db: &Database,
    config: &EngineConfig,
    name: Option<&str>,
    profile: Option<ProfileId>,
    allowance: Decimal,
    day: u32,
    expenses: &[String],
    goals: &[String],
) -> Result<ProfileId> {
    let input = OnboardingInput {
        allowance,
        allowance_day: AllowanceDay::new(day)?,
        expenses: expenses
            .iter()
            .map(|raw| parse_named_amount(raw).map(|(title, amount)| Expense { title, amount }))
            .collect::<Result<_>>()?,
        goals: goals
            .iter()
            .map(|raw| parse_named_amount(raw).map(|(name, amount)| NewGoal::new(&name, amount)))
            .collect::<Result<_>>()?,
    };

    let engine = offline_engine(db, config);
    let saved = match (profile, name) {
        (Some(id), _) => {
            let saved = engine.submit_onboarding(id, input)?;
            println!("✏️  Updated profile {} ({})", saved.id, saved.name);
            println!("   Plan cleared. Run 'fley plan --profile {}' to generate a new one.", saved.id);
            saved
        }
        (None, Some(name)) => {
            let saved = engine.create_profile(name, input)?;
            println!("✅ Created profile {} ({})", saved.id, saved.name);
            saved
        }
        (None, None) => bail!("Provide --name to create a profile or --profile to update one"),
    };

    println!("   Allowance: {} on day {}", money(saved.allowance), saved.allowance_day);
    println!(
        "   Recurring expenses: {} ({} items)",
        money(saved.total_expenses()),
        saved.expenses.len()
    );
    println!("   Left after expenses: {}", money(saved.remaining_after_expenses()));
    if saved.remaining_after_expenses() <= Decimal::ZERO {
        println!("   ⚠️  Expenses use the whole allowance; no plan can be generated");
    }
    Ok(saved.id)
}

pub fn cmd_profile_list(db: &Database) -> Result<()> {
    let profiles = db.list_profiles()?;

    if profiles.is_empty() {
        println!("No profiles found. Create one with:");
        println!("  fley onboard --name Ana --allowance 1000 --day 5");
        return Ok(());
    }

    println!();
    println!("👤 Profiles");
    println!("   ─────────────────────────────");
    for row in profiles {
        let link = row
            .external_link_id
            .map(|id| format!(" [linked: {}]", id))
            .unwrap_or_default();
        println!(
            "   #{:<4} {}{} (updated {})",
            row.id,
            row.name,
            link,
            row.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub fn cmd_profile_show(
    db: &Database,
    config: &EngineConfig,
    target: &Target,
    json: bool,
) -> Result<()> {
    let engine = offline_engine(db, config);
    let profile = target.read(&engine)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(());
    }

    print_profile(&profile);
    Ok(())
}

fn print_profile(profile: &FinanceProfile) {
    println!();
    println!("👤 {} (#{})", profile.name, profile.id);
    println!("   ─────────────────────────────");
    if let Some(link) = &profile.external_link_id {
        println!("   Linked to: {}", link);
    }
    println!(
        "   Allowance: {} on day {}",
        money(profile.allowance),
        profile.allowance_day
    );

    if !profile.expenses.is_empty() {
        println!();
        println!("   Recurring expenses:");
        for expense in &profile.expenses {
            println!("     {:<24} {:>10}", expense.title, money(expense.amount));
        }
    }

    if !profile.goals.is_empty() {
        println!();
        println!("   Goals:");
        for (i, goal) in profile.goals.iter().enumerate() {
            let eta = goal
                .estimated_date
                .map(|d| format!("est. {}", d))
                .unwrap_or_else(|| "no estimate".to_string());
            println!(
                "     {}. {:<21} {:>10}  {}",
                i + 1,
                goal.name,
                money(goal.target_amount),
                eta
            );
        }
    }

    println!();
    match &profile.ai_plan {
        Some(plan) => {
            println!(
                "   Plan: {} entertainment / {} savings",
                money(plan.monthly_split.entertainment),
                money(plan.monthly_split.savings)
            );
        }
        None => println!("   Plan: none (run 'fley plan --profile {}')", profile.id),
    }
    println!("   🎉 Entertainment left: {}", money(profile.entertainment));
    println!(
        "   💰 Saved: {} ({} checkpoints)",
        money(profile.savings_history.current_total()),
        profile.savings_history.len()
    );
    if profile.deferred_deficit > Decimal::ZERO {
        println!("   ⏳ Deferred deficit: {}", money(profile.deferred_deficit));
    }
}

pub fn cmd_link(
    db: &Database,
    config: &EngineConfig,
    profile: ProfileId,
    external_id: &str,
) -> Result<()> {
    let engine = offline_engine(db, config);
    let saved = engine.link_external(profile, external_id)?;
    println!(
        "🔗 Linked {} to profile {} ({})",
        external_id.trim(),
        saved.id,
        saved.name
    );
    Ok(())
}
