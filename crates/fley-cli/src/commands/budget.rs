//! Budget command implementations (plan, spend, balance, stats, project)

use anyhow::Result;
use fley_core::{
    db::Database, EngineConfig, PlanClient, PlanProvider, ProfileSummary, SpendReceipt,
};
use rust_decimal::Decimal;

use super::{build_engine, money, offline_engine, Target};

pub async fn cmd_plan(
    db: &Database,
    config: &EngineConfig,
    provider: PlanClient,
    target: &Target,
) -> Result<()> {
    println!(
        "🤖 Requesting a plan from {} ({})...",
        provider.kind(),
        provider.model()
    );

    let engine = build_engine(db, config, provider);
    let id = match target {
        Target::Id(id) => *id,
        Target::External(_) => target.read(&engine)?.id,
    };
    let generated = engine.generate_plan(id).await?;
    let plan = &generated.validated.plan;

    println!();
    println!("📋 Monthly plan for {}", generated.profile.name);
    println!("   ─────────────────────────────");
    println!(
        "   Left after expenses: {}",
        money(generated.validated.remaining)
    );
    println!(
        "   🎉 Entertainment:    {}",
        money(plan.monthly_split.entertainment)
    );
    println!("   💰 Savings:          {}", money(plan.monthly_split.savings));

    if let Some(goal_plan) = &plan.goal_plan {
        println!();
        println!(
            "   🎯 {}: {} per month for {} months",
            goal_plan.goal,
            money(goal_plan.monthly_saving),
            goal_plan.months_needed
        );
        if let Some(date) = generated.estimated_date {
            println!("      Estimated completion: {}", date);
        }
    }
    if let Some(purpose) = &plan.savings_purpose {
        println!();
        println!("   🏦 Savings purpose: {}", purpose);
    }

    if !plan.discipline_rules.is_empty() {
        println!();
        println!("   Rules:");
        for rule in &plan.discipline_rules {
            println!("     • {}", rule);
        }
    }

    Ok(())
}

pub fn cmd_spend(
    db: &Database,
    config: &EngineConfig,
    target: &Target,
    amount: Decimal,
    title: &str,
) -> Result<SpendReceipt> {
    let engine = offline_engine(db, config);
    let receipt = match target {
        Target::Id(id) => engine.apply_spend(*id, amount, title)?,
        Target::External(external_id) => {
            engine.apply_spend_by_external_id(external_id, amount, title)?
        }
    };

    let outcome = &receipt.outcome;
    println!("💸 Recorded {} for {}", money(amount), title.trim());
    println!("   🎉 Entertainment left: {}", money(outcome.entertainment));
    if outcome.absorbed > Decimal::ZERO {
        println!(
            "   ⚠️  {} over budget, taken from savings",
            money(outcome.absorbed)
        );
    }
    if outcome.unabsorbed > Decimal::ZERO {
        println!(
            "   ⚠️  {} over budget with no savings to absorb it",
            money(outcome.unabsorbed)
        );
    }
    println!("   💰 Saved: {}", money(outcome.savings_total));

    Ok(receipt)
}

fn summary(db: &Database, config: &EngineConfig, target: &Target) -> Result<ProfileSummary> {
    let engine = offline_engine(db, config);
    let summary = match target {
        Target::Id(id) => engine.summary(*id)?,
        Target::External(external_id) => engine.summary_by_external_id(external_id)?,
    };
    Ok(summary)
}

pub fn cmd_balance(db: &Database, config: &EngineConfig, target: &Target) -> Result<()> {
    let summary = summary(db, config, target)?;

    println!();
    println!("💳 Balance for {}", summary.name);
    println!("   ─────────────────────────────");
    println!("   🎉 Entertainment: {}", money(summary.entertainment));
    println!("   💰 Saved:         {}", money(summary.total_saved));
    if !summary.has_plan {
        println!();
        println!(
            "   💡 Tip: run 'fley plan --profile {}' to start the savings ledger",
            summary.profile_id
        );
    }
    Ok(())
}

pub fn cmd_stats(db: &Database, config: &EngineConfig, target: &Target) -> Result<()> {
    let summary = summary(db, config, target)?;

    println!();
    println!("📊 Stats for {}", summary.name);
    println!("   ─────────────────────────────");
    println!(
        "   Recurring expenses: {} ({} items)",
        money(summary.recurring_total),
        summary.recurring_count
    );
    println!("   Variable expenses:  {}", money(summary.variable_total));
    println!("   Total spent:        {}", money(summary.total_spent));
    println!("   Saved:              {}", money(summary.total_saved));

    if !summary.goals.is_empty() {
        println!();
        println!("   🎯 Goals:");
        for goal in &summary.goals {
            let progress = if goal.target_amount > Decimal::ZERO {
                (summary.total_saved / goal.target_amount * Decimal::ONE_HUNDRED)
                    .min(Decimal::ONE_HUNDRED)
                    .round_dp(0)
            } else {
                Decimal::ZERO
            };
            let eta = goal
                .estimated_date
                .map(|d| format!(", est. {}", d))
                .unwrap_or_default();
            println!(
                "     {} - {} ({}%{})",
                goal.name,
                money(goal.target_amount),
                progress,
                eta
            );
        }
    }
    Ok(())
}

pub fn cmd_project(
    db: &Database,
    config: &EngineConfig,
    target: &Target,
    months: u32,
) -> Result<()> {
    let engine = offline_engine(db, config);
    let profile = target.read(&engine)?;
    let projection = engine.projection(profile.id, months)?;

    println!();
    println!("📈 Projected savings for {} (from zero)", profile.name);
    println!("   ─────────────────────────────");
    for point in &projection {
        println!("   {}  {:>12}", point.date, money(point.amount));
    }
    Ok(())
}
