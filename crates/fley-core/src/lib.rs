//! Fley Core Library
//!
//! Budget ledger and plan reconciliation engine for the Fley allowance tracker:
//! - Savings ledger with lazy catch-up of missed allowance periods
//! - Spend processing against the entertainment sub-budget
//! - Budget plan generation through pluggable providers (Gemini, OpenAI-compatible)
//! - Goal completion estimates
//! - Reconciliation orchestrator with optimistic concurrency over a profile store
//! - SQLite (SQLCipher) profile storage
//! - Prompt library and engine configuration

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod goals;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod plan;
pub mod prompts;
pub mod spend;
pub mod store;

/// Test utilities including mock Gemini server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{EngineConfig, LedgerConfig, PlanConfig, StoreConfig};
pub use db::Database;
pub use error::{Error, Result};
pub use goals::GoalMergeStrategy;
pub use ledger::{CatchUpOutcome, ProjectedPoint, Projection, SavingsCheckpoint, SavingsLedger};
pub use models::{
    AllowanceDay, BudgetPlan, Expense, FinanceProfile, Goal, GoalPlan, MonthlySplit, NewGoal,
    OnboardingInput, ProfileId, ProfileSummary, VariableExpense, MAX_AMOUNT,
};
pub use orchestrator::{
    Clock, FixedClock, GeneratedPlan, ReconciliationOrchestrator, SpendReceipt, SystemClock,
};
pub use plan::{
    GeminiBackend, MockBackend, MockReply, OpenAICompatibleBackend, PlanClient, PlanGenerator,
    PlanProvider, RetryPolicy, ValidatedPlan,
};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use spend::{DeficitPolicy, SpendOutcome, SpendProcessor};
pub use store::{MemoryStore, ProfileStore};
