//! Reconciliation orchestrator: the entry point for every profile read and write
//!
//! Each flow loads a profile, mutates a copy and commits it with a single
//! versioned [`ProfileStore::save`]. When another writer got there first the
//! flow reloads and re-applies its change, up to `store.max_save_attempts`.
//!
//! - Read: catch the savings ledger up to today, persisting only if it moved
//! - Generate: ask the plan provider for a split, estimate the top goal, seed
//!   the ledger and store everything together
//! - Spend: catch up, then apply the spend against entertainment and savings
//! - Onboarding and linking: replace expenses and goals, attach a chat id

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::goals::{apply_estimate, merge_resubmitted};
use crate::ledger::{CatchUpOutcome, Projection, SavingsLedger};
use crate::models::{FinanceProfile, OnboardingInput, ProfileId, ProfileSummary};
use crate::plan::{PlanClient, PlanGenerator, PlanProvider, ValidatedPlan};
use crate::spend::{SpendOutcome, SpendProcessor};
use crate::store::ProfileStore;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    /// Clock fixed at midday UTC on `date`
    pub fn on(date: NaiveDate) -> Self {
        Self::new(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.0.lock() {
            *current = now;
        }
    }

    pub fn set_date(&self, date: NaiveDate) {
        self.set(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc());
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/// Result of a successful plan generation
#[derive(Debug, Clone)]
pub struct GeneratedPlan {
    pub validated: ValidatedPlan,
    /// New estimate for the top-priority goal, if one was computed
    pub estimated_date: Option<NaiveDate>,
    /// Profile as stored after the plan was applied
    pub profile: FinanceProfile,
}

/// Result of a successful spend
#[derive(Debug, Clone)]
pub struct SpendReceipt {
    pub outcome: SpendOutcome,
    pub profile: FinanceProfile,
}

pub struct ReconciliationOrchestrator<S: ProfileStore, P: PlanProvider = PlanClient> {
    store: S,
    planner: PlanGenerator<P>,
    spender: SpendProcessor,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S: ProfileStore, P: PlanProvider> ReconciliationOrchestrator<S, P> {
    pub fn new(store: S, provider: P, config: EngineConfig) -> Self {
        let planner = PlanGenerator::with_config(provider, &config.plan);
        Self::with_planner(store, planner, config)
    }

    /// Use a pre-built plan generator (custom retry policy or prompt library)
    pub fn with_planner(store: S, planner: PlanGenerator<P>, config: EngineConfig) -> Self {
        Self {
            store,
            planner,
            spender: SpendProcessor::new(config.ledger.deficit_policy),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn planner(&self) -> &PlanGenerator<P> {
        &self.planner
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- Onboarding ---

    /// Create a profile from an onboarding submission
    pub fn create_profile(&self, name: &str, input: OnboardingInput) -> Result<FinanceProfile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("profile name is required".into()));
        }
        let mut profile = FinanceProfile::new(name, self.clock.now());
        self.apply_onboarding(&mut profile, input)?;

        let created = self.store.create(&profile)?;
        info!(
            profile_id = created.id,
            goals = created.goals.len(),
            expenses = created.expenses.len(),
            "Profile created"
        );
        Ok(created)
    }

    /// Replace allowance, expenses and goals; clears the plan, keeps the ledger
    pub fn submit_onboarding(&self, id: ProfileId, input: OnboardingInput) -> Result<FinanceProfile> {
        input.validate()?;
        let current = self.load(id)?;
        let (saved, ()) = self.commit(current, |profile| {
            self.apply_onboarding(profile, input.clone())?;
            Ok(((), true))
        })?;
        info!(profile_id = saved.id, "Onboarding updated, plan cleared");
        Ok(saved)
    }

    fn apply_onboarding(&self, profile: &mut FinanceProfile, input: OnboardingInput) -> Result<()> {
        input.validate()?;
        profile.allowance = input.allowance;
        profile.allowance_day = input.allowance_day;
        profile.expenses = input
            .expenses
            .into_iter()
            .map(|mut e| {
                e.title = e.title.trim().to_string();
                e
            })
            .collect();
        profile.goals = merge_resubmitted(&profile.goals, input.goals, self.config.ledger.goal_merge);
        profile.ai_plan = None;
        profile.onboarding_completed = true;
        Ok(())
    }

    /// Attach a chat gateway id to a profile
    pub fn link_external(&self, id: ProfileId, external_id: &str) -> Result<FinanceProfile> {
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(Error::Validation("external id is required".into()));
        }
        if let Some(holder) = self.store.find_by_external_link_id(external_id)? {
            if holder.id != id {
                return Err(Error::Validation(format!(
                    "external id {} is already linked to another profile",
                    external_id
                )));
            }
        }

        let current = self.load(id)?;
        let (saved, ()) = self.commit(current, |profile| {
            let changed = profile.external_link_id.as_deref() != Some(external_id);
            profile.external_link_id = Some(external_id.to_string());
            Ok(((), changed))
        })?;
        info!(profile_id = saved.id, "External id linked");
        Ok(saved)
    }

    // --- Read flow ---

    /// Load a profile with its savings ledger caught up to today
    pub fn read_profile(&self, id: ProfileId) -> Result<FinanceProfile> {
        let current = self.load(id)?;
        self.read_caught_up(current)
    }

    /// Same as [`read_profile`](Self::read_profile), located by chat gateway id
    pub fn read_profile_by_external_id(&self, external_id: &str) -> Result<FinanceProfile> {
        let current = self.load_by_external_id(external_id)?;
        self.read_caught_up(current)
    }

    fn read_caught_up(&self, current: FinanceProfile) -> Result<FinanceProfile> {
        let today = self.clock.today();
        let (profile, outcome) = self.commit(current, |profile| {
            let outcome = self.reconcile(profile, today)?;
            Ok((outcome, outcome.changed()))
        })?;
        if outcome.changed() {
            info!(
                profile_id = profile.id,
                ?outcome,
                total = %profile.savings_history.current_total(),
                "Savings ledger caught up"
            );
        }
        Ok(profile)
    }

    /// Catch the ledger up using the plan's savings as the monthly accrual
    ///
    /// Without a plan there is no accrual rate and the ledger is left alone.
    fn reconcile(&self, profile: &mut FinanceProfile, today: NaiveDate) -> Result<CatchUpOutcome> {
        let Some(split) = profile.ai_plan.as_ref().map(|p| p.monthly_split) else {
            return Ok(CatchUpOutcome::Unchanged);
        };

        let outcome = profile
            .savings_history
            .catch_up(profile.allowance_day, split.savings, today)?;
        match outcome {
            CatchUpOutcome::Initialized => {
                self.settle_deferred_deficit(profile);
            }
            CatchUpOutcome::Appended(_) if self.config.ledger.refill_entertainment_on_rollover => {
                profile.entertainment = split.entertainment;
            }
            _ => {}
        }
        Ok(outcome)
    }

    fn settle_deferred_deficit(&self, profile: &mut FinanceProfile) {
        if profile.deferred_deficit > Decimal::ZERO
            && profile.savings_history.absorb_deficit(profile.deferred_deficit)
        {
            debug!(profile_id = profile.id, deficit = %profile.deferred_deficit, "Deferred deficit settled");
            profile.deferred_deficit = Decimal::ZERO;
        }
    }

    // --- Generate flow ---

    /// Request a new plan and store it with the goal estimate and ledger seed
    ///
    /// The provider is called once. If the profile changes underneath and its
    /// remaining money no longer matches the plan, the flow fails with
    /// [`Error::Conflict`] rather than storing a stale plan.
    pub async fn generate_plan(&self, id: ProfileId) -> Result<GeneratedPlan> {
        let current = self.load(id)?;
        let validated = self.planner.generate(&current).await?;
        let today = self.clock.today();

        let (profile, estimated_date) = self.commit(current, |profile| {
            if profile.allowance <= Decimal::ZERO
                || profile.remaining_after_expenses() != validated.remaining
            {
                warn!(profile_id = profile.id, "Profile changed while the plan was generated");
                return Err(Error::Conflict(format!(
                    "profile {} changed while the plan was generated",
                    profile.id
                )));
            }

            let plan = validated.plan.clone();
            let estimated_date = apply_estimate(&mut profile.goals, &plan, today);
            if profile.savings_history.is_empty() {
                let seed = plan
                    .monthly_split
                    .savings
                    .saturating_sub(profile.deferred_deficit);
                profile.savings_history.seed(today, seed);
                profile.deferred_deficit = Decimal::ZERO;
            }
            profile.entertainment = plan.monthly_split.entertainment;
            profile.ai_plan = Some(plan);
            Ok((estimated_date, true))
        })?;

        info!(
            profile_id = profile.id,
            entertainment = %validated.plan.monthly_split.entertainment,
            savings = %validated.plan.monthly_split.savings,
            estimated_date = ?estimated_date,
            "Plan stored"
        );
        Ok(GeneratedPlan {
            validated,
            estimated_date,
            profile,
        })
    }

    // --- Spend flow ---

    pub fn apply_spend(&self, id: ProfileId, amount: Decimal, title: &str) -> Result<SpendReceipt> {
        let current = self.load(id)?;
        self.spend(current, amount, title)
    }

    pub fn apply_spend_by_external_id(
        &self,
        external_id: &str,
        amount: Decimal,
        title: &str,
    ) -> Result<SpendReceipt> {
        let current = self.load_by_external_id(external_id)?;
        self.spend(current, amount, title)
    }

    fn spend(&self, current: FinanceProfile, amount: Decimal, title: &str) -> Result<SpendReceipt> {
        let now = self.clock.now();
        let today = self.clock.today();
        let (profile, outcome) = self.commit(current, |profile| {
            self.reconcile(profile, today)?;
            let outcome = self.spender.apply_spend(profile, amount, title, now)?;
            Ok((outcome, true))
        })?;
        info!(
            profile_id = profile.id,
            %amount,
            entertainment = %outcome.entertainment,
            absorbed = %outcome.absorbed,
            "Spend recorded"
        );
        Ok(SpendReceipt { outcome, profile })
    }

    // --- Reporting ---

    /// Balance and spending overview after catching the ledger up
    pub fn summary(&self, id: ProfileId) -> Result<ProfileSummary> {
        Ok(self.read_profile(id)?.summary())
    }

    pub fn summary_by_external_id(&self, external_id: &str) -> Result<ProfileSummary> {
        Ok(self.read_profile_by_external_id(external_id)?.summary())
    }

    /// Illustrative savings curve from today using the plan's monthly savings
    pub fn projection(&self, id: ProfileId, horizon_months: u32) -> Result<Projection> {
        let profile = self.read_profile(id)?;
        let accrual = profile.monthly_accrual().ok_or_else(|| {
            Error::Validation(format!(
                "profile {} has no plan yet; generate one first",
                profile.id
            ))
        })?;
        Ok(SavingsLedger::projected(
            accrual,
            horizon_months,
            self.clock.today(),
        ))
    }

    // --- Helpers ---

    fn load(&self, id: ProfileId) -> Result<FinanceProfile> {
        self.store
            .find_by_id(id)?
            .ok_or_else(|| Error::NotFound(format!("profile {}", id)))
    }

    fn load_by_external_id(&self, external_id: &str) -> Result<FinanceProfile> {
        self.store
            .find_by_external_link_id(external_id)?
            .ok_or_else(|| Error::NotLinked(external_id.to_string()))
    }

    /// Apply `change` to a copy of `current` and save it, retrying on conflict
    ///
    /// `change` returns its result and whether the profile was modified; an
    /// unmodified profile is not saved. On conflict the profile is reloaded
    /// and `change` runs again on the fresh copy.
    fn commit<T>(
        &self,
        mut current: FinanceProfile,
        mut change: impl FnMut(&mut FinanceProfile) -> Result<(T, bool)>,
    ) -> Result<(FinanceProfile, T)> {
        let max_attempts = self.config.store.max_save_attempts.max(1);
        let mut attempt = 1;
        loop {
            let mut working = current.clone();
            let (value, changed) = change(&mut working)?;
            if !changed {
                return Ok((working, value));
            }
            match self.store.save(&working) {
                Ok(saved) => return Ok((saved, value)),
                Err(Error::Conflict(reason)) if attempt < max_attempts => {
                    debug!(profile_id = current.id, attempt, %reason, "Concurrent update, retrying");
                    current = self.load(current.id)?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SavingsCheckpoint;
    use crate::models::{Expense, NewGoal};
    use crate::plan::{MockBackend, MockReply, RetryPolicy};
    use crate::prompts::{PromptLibrary, RenderedPrompt};
    use crate::spend::DeficitPolicy;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn plan_reply(entertainment: &str, savings: &str, months: u32) -> MockReply {
        MockReply::Text(format!(
            r#"{{"monthlySplit": {{"entertainment": {}, "savings": {}}}, "goalPlan": {{"goal": "Laptop", "monthlySaving": {}, "monthsNeeded": {}}}, "disciplineRules": ["Cook at home"]}}"#,
            entertainment, savings, savings, months
        ))
    }

    fn onboarding(allowance: Decimal, day: u32) -> OnboardingInput {
        OnboardingInput {
            allowance,
            allowance_day: crate::models::AllowanceDay::new(day).unwrap(),
            expenses: vec![Expense {
                title: "Rent".into(),
                amount: dec!(300),
            }],
            goals: vec![NewGoal::new("Laptop", dec!(1200))],
        }
    }

    struct Harness {
        engine: ReconciliationOrchestrator<MemoryStore, MockBackend>,
        mock: MockBackend,
        clock: Arc<FixedClock>,
    }

    fn harness(config: EngineConfig, today: NaiveDate) -> Harness {
        let mock = MockBackend::new();
        let clock = Arc::new(FixedClock::on(today));
        let planner = PlanGenerator::with_config(mock.clone(), &config.plan)
            .with_retry(RetryPolicy::immediate(3))
            .with_prompts(PromptLibrary::embedded_only());
        let engine = ReconciliationOrchestrator::with_planner(MemoryStore::new(), planner, config)
            .with_clock(clock.clone());
        Harness {
            engine,
            mock,
            clock,
        }
    }

    #[tokio::test]
    async fn test_generate_persists_plan_estimate_and_seed() {
        let h = harness(EngineConfig::default(), date(2024, 1, 15));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();
        h.mock.push_replies([plan_reply("400", "300", 6)]);

        let generated = h.engine.generate_plan(created.id).await.unwrap();

        assert_eq!(generated.estimated_date, Some(date(2024, 7, 15)));
        let stored = h.engine.store().find_by_id(created.id).unwrap().unwrap();
        assert_eq!(stored.goals[0].estimated_date, Some(date(2024, 7, 15)));
        assert_eq!(stored.entertainment, dec!(400));
        assert_eq!(
            stored.savings_history.checkpoints(),
            &[SavingsCheckpoint {
                date: date(2024, 1, 15),
                amount: dec!(300)
            }]
        );
        assert!(stored.ai_plan.is_some());
    }

    #[tokio::test]
    async fn test_rejected_plan_keeps_previous_plan() {
        let h = harness(EngineConfig::default(), date(2024, 1, 15));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();
        h.mock
            .push_replies([plan_reply("400", "300", 6), plan_reply("500", "300", 6)]);

        h.engine.generate_plan(created.id).await.unwrap();
        let before = h.engine.store().find_by_id(created.id).unwrap().unwrap();

        let result = h.engine.generate_plan(created.id).await;
        assert!(matches!(result, Err(Error::InvalidPlanArithmetic { .. })));

        let after = h.engine.store().find_by_id(created.id).unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_read_catches_up_and_refills_entertainment() {
        let h = harness(EngineConfig::default(), date(2024, 1, 5));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();
        h.mock.push_replies([plan_reply("400", "300", 6)]);
        h.engine.generate_plan(created.id).await.unwrap();
        h.engine.apply_spend(created.id, dec!(150), "Concert").unwrap();

        h.clock.set_date(date(2024, 3, 10));
        let profile = h.engine.read_profile(created.id).unwrap();

        let amounts: Vec<_> = profile
            .savings_history
            .checkpoints()
            .iter()
            .map(|c| (c.date, c.amount))
            .collect();
        assert_eq!(
            amounts,
            vec![
                (date(2024, 1, 5), dec!(300)),
                (date(2024, 2, 5), dec!(600)),
                (date(2024, 3, 5), dec!(900)),
            ]
        );
        assert_eq!(profile.entertainment, dec!(400));

        let again = h.engine.read_profile(created.id).unwrap();
        assert_eq!(again.version, profile.version);
    }

    #[tokio::test]
    async fn test_rollover_refill_can_be_disabled() {
        let mut config = EngineConfig::default();
        config.ledger.refill_entertainment_on_rollover = false;
        let h = harness(config, date(2024, 1, 5));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();
        h.mock.push_replies([plan_reply("400", "300", 6)]);
        h.engine.generate_plan(created.id).await.unwrap();
        h.engine.apply_spend(created.id, dec!(150), "Concert").unwrap();

        h.clock.set_date(date(2024, 2, 6));
        let profile = h.engine.read_profile(created.id).unwrap();
        assert_eq!(profile.entertainment, dec!(250));
        assert_eq!(profile.savings_history.len(), 2);
    }

    #[test]
    fn test_read_without_plan_leaves_ledger_alone() {
        let h = harness(EngineConfig::default(), date(2024, 1, 5));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();

        let profile = h.engine.read_profile(created.id).unwrap();
        assert!(profile.savings_history.is_empty());
        assert_eq!(profile.version, created.version);
    }

    #[tokio::test]
    async fn test_spend_absorbs_overflow() {
        let h = harness(EngineConfig::default(), date(2024, 1, 5));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(830), 5))
            .unwrap();
        h.mock.push_replies([plan_reply("30", "500", 6)]);
        h.engine.generate_plan(created.id).await.unwrap();

        let receipt = h.engine.apply_spend(created.id, dec!(50), "Shoes").unwrap();

        assert_eq!(receipt.outcome.entertainment, dec!(0));
        assert_eq!(receipt.outcome.savings_total, dec!(480));
        assert_eq!(receipt.profile.variable_expenses.len(), 1);
    }

    #[tokio::test]
    async fn test_deferred_deficit_settles_on_seed() {
        let mut config = EngineConfig::default();
        config.ledger.deficit_policy = DeficitPolicy::Defer;
        let h = harness(config, date(2024, 1, 5));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();

        let receipt = h.engine.apply_spend(created.id, dec!(40), "Games").unwrap();
        assert_eq!(receipt.outcome.unabsorbed, dec!(40));
        assert_eq!(receipt.profile.deferred_deficit, dec!(40));

        h.mock.push_replies([plan_reply("400", "300", 6)]);
        let generated = h.engine.generate_plan(created.id).await.unwrap();

        assert_eq!(generated.profile.savings_history.current_total(), dec!(260));
        assert_eq!(generated.profile.deferred_deficit, dec!(0));
    }

    #[tokio::test]
    async fn test_resubmission_clears_plan_and_keeps_ledger() {
        let h = harness(EngineConfig::default(), date(2024, 1, 15));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();
        h.mock.push_replies([plan_reply("400", "300", 6)]);
        h.engine.generate_plan(created.id).await.unwrap();

        let mut input = onboarding(dec!(1200), 10);
        input.goals = vec![
            NewGoal::new("Trip", dec!(500)),
            NewGoal::new("Laptop", dec!(1200)),
        ];
        let updated = h.engine.submit_onboarding(created.id, input).unwrap();

        assert!(updated.ai_plan.is_none());
        assert_eq!(updated.savings_history.current_total(), dec!(300));
        assert_eq!(updated.entertainment, dec!(400));
        assert_eq!(updated.goals[0].name, "Trip");
        assert_eq!(updated.goals[0].estimated_date, None);
        assert_eq!(updated.goals[1].estimated_date, Some(date(2024, 7, 15)));
    }

    #[test]
    fn test_external_id_flows() {
        let h = harness(EngineConfig::default(), date(2024, 1, 15));
        let a = h.engine.create_profile("Ana", onboarding(dec!(1000), 5)).unwrap();
        let b = h.engine.create_profile("Ben", onboarding(dec!(1000), 5)).unwrap();

        h.engine.link_external(a.id, "tg-42").unwrap();
        assert!(matches!(
            h.engine.link_external(b.id, "tg-42"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            h.engine.read_profile_by_external_id("tg-7"),
            Err(Error::NotLinked(_))
        ));

        let summary = h.engine.summary_by_external_id("tg-42").unwrap();
        assert_eq!(summary.profile_id, a.id);
        assert_eq!(summary.recurring_total, dec!(300));
    }

    #[test]
    fn test_unknown_profile() {
        let h = harness(EngineConfig::default(), date(2024, 1, 15));
        assert!(matches!(h.engine.read_profile(9), Err(Error::NotFound(_))));
        assert!(matches!(
            h.engine.apply_spend(9, dec!(1), "x"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_projection_uses_plan_savings() {
        let h = harness(EngineConfig::default(), date(2024, 1, 15));
        let created = h
            .engine
            .create_profile("Ana", onboarding(dec!(1000), 5))
            .unwrap();
        assert!(matches!(
            h.engine.projection(created.id, 6),
            Err(Error::Validation(_))
        ));

        h.mock.push_replies([plan_reply("400", "300", 6)]);
        h.engine.generate_plan(created.id).await.unwrap();
        let points: Vec<_> = h.engine.projection(created.id, 2).unwrap().iter().collect();

        assert_eq!(points.len(), 3);
        assert_eq!(points[2].date, date(2024, 3, 15));
        assert_eq!(points[2].amount, dec!(600));
    }

    /// Store that reports a conflict for the first `conflicts` saves
    struct FlakyStore {
        inner: MemoryStore,
        conflicts: AtomicUsize,
        saves: AtomicUsize,
    }

    impl ProfileStore for FlakyStore {
        fn create(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
            self.inner.create(profile)
        }

        fn find_by_id(&self, id: ProfileId) -> Result<Option<FinanceProfile>> {
            self.inner.find_by_id(id)
        }

        fn find_by_external_link_id(&self, external_id: &str) -> Result<Option<FinanceProfile>> {
            self.inner.find_by_external_link_id(external_id)
        }

        fn save(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Conflict("simulated".into()));
            }
            self.inner.save(profile)
        }
    }

    fn flaky_engine(conflicts: usize) -> ReconciliationOrchestrator<FlakyStore, MockBackend> {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            conflicts: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
        };
        let engine = ReconciliationOrchestrator::new(store, MockBackend::new(), EngineConfig::default())
            .with_clock(Arc::new(FixedClock::on(date(2024, 1, 15))));
        engine.store().conflicts.store(conflicts, Ordering::SeqCst);
        engine
    }

    #[test]
    fn test_conflicts_are_retried() {
        let engine = flaky_engine(2);
        let created = engine.create_profile("Ana", onboarding(dec!(1000), 5)).unwrap();

        engine.apply_spend(created.id, dec!(10), "Snack").unwrap();

        assert_eq!(engine.store().saves.load(Ordering::SeqCst), 3);
        let stored = engine.store().find_by_id(created.id).unwrap().unwrap();
        assert_eq!(stored.variable_expenses.len(), 1);
    }

    #[test]
    fn test_persistent_conflict_surfaces() {
        let engine = flaky_engine(100);
        let created = engine.create_profile("Ana", onboarding(dec!(1000), 5)).unwrap();

        let result = engine.apply_spend(created.id, dec!(10), "Snack");

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(engine.store().saves.load(Ordering::SeqCst), 5);
    }

    /// Shares one `MemoryStore` between the engine and a test provider
    struct SharedStore(Arc<MemoryStore>);

    impl ProfileStore for SharedStore {
        fn create(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
            self.0.create(profile)
        }

        fn find_by_id(&self, id: ProfileId) -> Result<Option<FinanceProfile>> {
            self.0.find_by_id(id)
        }

        fn find_by_external_link_id(&self, external_id: &str) -> Result<Option<FinanceProfile>> {
            self.0.find_by_external_link_id(external_id)
        }

        fn save(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
            self.0.save(profile)
        }
    }

    /// Provider that edits the stored profile while the plan is being generated
    struct MeddlingProvider {
        store: Arc<MemoryStore>,
        id: ProfileId,
        edit: fn(&mut FinanceProfile),
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PlanProvider for MeddlingProvider {
        async fn complete(&self, _prompt: &RenderedPrompt, _temperature: f32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut profile = self
                .store
                .find_by_id(self.id)?
                .ok_or_else(|| Error::NotFound(format!("profile {}", self.id)))?;
            (self.edit)(&mut profile);
            self.store.save(&profile)?;
            match plan_reply("400", "300", 6) {
                MockReply::Text(text) => Ok(text),
                _ => unreachable!(),
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn model(&self) -> &str {
            "meddling"
        }

        fn host(&self) -> &str {
            "memory"
        }
    }

    fn meddling_engine(
        edit: fn(&mut FinanceProfile),
    ) -> (
        ReconciliationOrchestrator<SharedStore, MeddlingProvider>,
        Arc<MemoryStore>,
        ProfileId,
    ) {
        let shared = Arc::new(MemoryStore::new());
        let created = ReconciliationOrchestrator::new(
            SharedStore(shared.clone()),
            MockBackend::new(),
            EngineConfig::default(),
        )
        .create_profile("Ana", onboarding(dec!(1000), 5))
        .unwrap();

        let provider = MeddlingProvider {
            store: shared.clone(),
            id: created.id,
            edit,
            calls: AtomicUsize::new(0),
        };
        let config = EngineConfig::default();
        let planner = PlanGenerator::with_config(provider, &config.plan)
            .with_retry(RetryPolicy::immediate(3))
            .with_prompts(PromptLibrary::embedded_only());
        let engine = ReconciliationOrchestrator::with_planner(SharedStore(shared.clone()), planner, config)
            .with_clock(Arc::new(FixedClock::on(date(2024, 1, 15))));
        (engine, shared, created.id)
    }

    #[tokio::test]
    async fn test_generate_fails_when_expenses_changed_meanwhile() {
        let (engine, shared, id) = meddling_engine(|profile| {
            profile.expenses.push(Expense {
                title: "Gym".into(),
                amount: dec!(40),
            });
        });

        let result = engine.generate_plan(id).await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        let stored = shared.find_by_id(id).unwrap().unwrap();
        assert!(stored.ai_plan.is_none());
        assert!(stored.savings_history.is_empty());
        assert_eq!(stored.expenses.len(), 2);
        assert_eq!(engine.planner().provider().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generate_reapplies_plan_after_unrelated_change() {
        let (engine, shared, id) = meddling_engine(|profile| {
            profile.external_link_id = Some("tg-42".into());
        });

        let generated = engine.generate_plan(id).await.unwrap();

        assert_eq!(generated.estimated_date, Some(date(2024, 7, 15)));
        let stored = shared.find_by_id(id).unwrap().unwrap();
        assert_eq!(stored.external_link_id.as_deref(), Some("tg-42"));
        assert!(stored.ai_plan.is_some());
        assert_eq!(stored.entertainment, dec!(400));
        assert_eq!(stored.savings_history.current_total(), dec!(300));
    }

    #[test]
    fn test_create_profile_rejects_unbounded_amounts() {
        let h = harness(EngineConfig::default(), date(2024, 1, 15));
        let mut input = onboarding(dec!(1000), 5);
        input.expenses = vec![
            Expense {
                title: "A".into(),
                amount: Decimal::MAX,
            },
            Expense {
                title: "B".into(),
                amount: Decimal::MAX,
            },
        ];

        let result = h.engine.create_profile("Ana", input);

        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(h.engine.store().find_by_id(1).unwrap().is_none());
    }
}
