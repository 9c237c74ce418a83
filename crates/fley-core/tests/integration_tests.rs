//! Integration tests for fley-core
//!
//! These tests exercise the onboarding → plan → spend → catch-up workflow
//! against the SQLite store.

use std::sync::Arc;

use chrono::NaiveDate;
use fley_core::{
    db::Database,
    plan::{MockBackend, MockReply, PlanGenerator, RetryPolicy},
    AllowanceDay, EngineConfig, Error, Expense, FixedClock, NewGoal, OnboardingInput,
    PromptLibrary, ReconciliationOrchestrator,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn engine(
    db: Database,
    mock: &MockBackend,
    clock: Arc<FixedClock>,
) -> ReconciliationOrchestrator<Database, MockBackend> {
    let config = EngineConfig::default();
    let planner = PlanGenerator::with_config(mock.clone(), &config.plan)
        .with_retry(RetryPolicy::immediate(3))
        .with_prompts(PromptLibrary::embedded_only());
    ReconciliationOrchestrator::with_planner(db, planner, config).with_clock(clock)
}

fn student_onboarding() -> OnboardingInput {
    OnboardingInput {
        allowance: dec!(1000),
        allowance_day: AllowanceDay::new(5).unwrap(),
        expenses: vec![
            Expense {
                title: "Rent".into(),
                amount: dec!(250),
            },
            Expense {
                title: "Phone".into(),
                amount: dec!(50),
            },
        ],
        goals: vec![NewGoal::new("Laptop", dec!(1800))],
    }
}

fn split(entertainment: Decimal, savings: Decimal, months: u32) -> MockReply {
    MockReply::Text(format!(
        "```json\n{{\"monthlySplit\": {{\"entertainment\": {}, \"savings\": {}}}, \"goalPlan\": {{\"goal\": \"Laptop\", \"monthlySaving\": {}, \"monthsNeeded\": {}}}, \"disciplineRules\": [\"No takeout on weekdays\"]}}\n```",
        entertainment, savings, savings, months
    ))
}

// =============================================================================
// Full workflow
// =============================================================================

#[tokio::test]
async fn test_month_by_month_workflow() {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let mock = MockBackend::new();
    let clock = Arc::new(FixedClock::on(date(2024, 1, 5)));
    let engine = engine(db, &mock, clock.clone());

    let profile = engine
        .create_profile("Ana", student_onboarding())
        .expect("Failed to create profile");
    engine.link_external(profile.id, "tg-555").unwrap();

    // Plan: 700 left after expenses
    mock.push_replies([split(dec!(400), dec!(300), 6)]);
    let generated = engine.generate_plan(profile.id).await.unwrap();
    assert_eq!(generated.validated.remaining, dec!(700));
    assert_eq!(generated.estimated_date, Some(date(2024, 7, 5)));

    // Overspend via the chat gateway surface
    let receipt = engine
        .apply_spend_by_external_id("tg-555", dec!(420), "Concert tickets")
        .unwrap();
    assert_eq!(receipt.outcome.entertainment, dec!(0));
    assert_eq!(receipt.outcome.savings_total, dec!(280));

    // Two allowance days pass
    clock.set_date(date(2024, 3, 6));
    let summary = engine.summary_by_external_id("tg-555").unwrap();
    assert_eq!(summary.total_saved, dec!(880));
    assert_eq!(summary.entertainment, dec!(400));
    assert_eq!(summary.recurring_total, dec!(300));
    assert_eq!(summary.variable_total, dec!(420));
    assert_eq!(summary.total_spent, dec!(720));

    // Everything survived the round trip through SQLite
    let stored = engine.read_profile(profile.id).unwrap();
    let dates: Vec<_> = stored
        .savings_history
        .checkpoints()
        .iter()
        .map(|c| c.date)
        .collect();
    assert_eq!(dates, vec![date(2024, 1, 5), date(2024, 2, 5), date(2024, 3, 5)]);
    assert_eq!(stored.goals[0].estimated_date, Some(date(2024, 7, 5)));
    assert_eq!(stored.external_link_id.as_deref(), Some("tg-555"));
}

#[tokio::test]
async fn test_failed_generation_persists_nothing() {
    let db = Database::in_memory().unwrap();
    let mock = MockBackend::new();
    let clock = Arc::new(FixedClock::on(date(2024, 1, 15)));
    let engine = engine(db, &mock, clock);

    let profile = engine.create_profile("Ana", student_onboarding()).unwrap();
    mock.push_replies([
        MockReply::Status(503),
        MockReply::Status(503),
        MockReply::Status(503),
    ]);

    let result = engine.generate_plan(profile.id).await;
    assert!(matches!(result, Err(ref e) if e.is_transient()));
    assert_eq!(mock.calls(), 3);

    let stored = engine.read_profile(profile.id).unwrap();
    assert!(stored.ai_plan.is_none());
    assert!(stored.savings_history.is_empty());
    assert_eq!(stored.version, profile.version);
}

#[tokio::test]
async fn test_overspent_profile_never_calls_provider() {
    let db = Database::in_memory().unwrap();
    let mock = MockBackend::new();
    let engine = engine(db, &mock, Arc::new(FixedClock::on(date(2024, 1, 15))));

    let mut input = student_onboarding();
    input.expenses.push(Expense {
        title: "Tuition".into(),
        amount: dec!(700),
    });
    let profile = engine.create_profile("Ana", input).unwrap();

    let result = engine.generate_plan(profile.id).await;
    assert!(matches!(result, Err(Error::Overspent { .. })));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_resubmission_over_sqlite_keeps_estimates_by_identity() {
    let db = Database::in_memory().unwrap();
    let mock = MockBackend::new();
    let engine = engine(db, &mock, Arc::new(FixedClock::on(date(2024, 1, 15))));

    let profile = engine.create_profile("Ana", student_onboarding()).unwrap();
    mock.push_replies([split(dec!(400), dec!(300), 6)]);
    engine.generate_plan(profile.id).await.unwrap();

    let mut input = student_onboarding();
    input.goals.insert(0, NewGoal::new("Bike", dec!(400)));
    let updated = engine.submit_onboarding(profile.id, input).unwrap();

    assert!(updated.ai_plan.is_none());
    assert_eq!(updated.goals[0].name, "Bike");
    assert_eq!(updated.goals[0].estimated_date, None);
    assert_eq!(updated.goals[1].estimated_date, Some(date(2024, 7, 15)));
    assert_eq!(updated.savings_history.current_total(), dec!(300));
}
