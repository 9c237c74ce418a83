//! Budget plan generation through a pluggable plan provider
//!
//! # Architecture
//!
//! - `PlanProvider` trait: one text completion per call, plus health info
//! - `PlanClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - `PlanGenerator`: builds the request, renders the prompt, retries transient
//!   provider failures with exponential backoff, then parses and validates
//!
//! # Configuration
//!
//! Environment variables:
//! - `PLAN_BACKEND`: Backend to use (gemini, openai_compatible, mock). Default: gemini
//! - `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_HOST`: see [`GeminiBackend`]
//! - `OPENAI_COMPATIBLE_HOST`, `OPENAI_COMPATIBLE_MODEL`, `OPENAI_COMPATIBLE_API_KEY`:
//!   see [`OpenAICompatibleBackend`]

mod gemini;
mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use gemini::{GeminiBackend, DEFAULT_GEMINI_HOST, DEFAULT_GEMINI_MODEL};
pub use mock::{MockBackend, MockReply};
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::config::PlanConfig;
use crate::error::{Error, Result};
use crate::models::FinanceProfile;
use crate::prompts::{PromptId, PromptLibrary, RenderedPrompt};

/// Interface for all plan providers
#[async_trait]
pub trait PlanProvider: Send + Sync {
    /// Send a rendered prompt and return the raw response text
    ///
    /// Rate limiting, unavailability and connection failures must surface as
    /// [`Error::TransientProvider`] so the caller can retry them.
    async fn complete(&self, prompt: &RenderedPrompt, temperature: f32) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete plan client enum
#[derive(Clone)]
pub enum PlanClient {
    /// Google Gemini `generateContent`
    Gemini(GeminiBackend),
    /// OpenAI-compatible `/v1/chat/completions`
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl PlanClient {
    /// Create a plan client from environment variables
    ///
    /// Returns None if the selected backend's required variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("PLAN_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" | "google" => GeminiBackend::from_env().map(PlanClient::Gemini),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(PlanClient::OpenAICompatible)
            }
            "mock" => Some(PlanClient::mock()),
            _ => {
                warn!(backend = %backend, "Unknown PLAN_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(PlanClient::Gemini)
            }
        }
    }

    pub fn gemini(host: &str, model: &str, api_key: &str) -> Self {
        PlanClient::Gemini(GeminiBackend::new(host, model, api_key))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        PlanClient::Mock(MockBackend::new())
    }

    /// Short backend name for status output
    pub fn kind(&self) -> &'static str {
        match self {
            PlanClient::Gemini(_) => "gemini",
            PlanClient::OpenAICompatible(_) => "openai_compatible",
            PlanClient::Mock(_) => "mock",
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            PlanClient::Gemini(b) => PlanClient::Gemini(b.with_model(model)),
            PlanClient::OpenAICompatible(b) => PlanClient::OpenAICompatible(b.with_model(model)),
            PlanClient::Mock(b) => PlanClient::Mock(b.with_model(model)),
        }
    }
}

#[async_trait]
impl PlanProvider for PlanClient {
    async fn complete(&self, prompt: &RenderedPrompt, temperature: f32) -> Result<String> {
        match self {
            PlanClient::Gemini(b) => b.complete(prompt, temperature).await,
            PlanClient::OpenAICompatible(b) => b.complete(prompt, temperature).await,
            PlanClient::Mock(b) => b.complete(prompt, temperature).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            PlanClient::Gemini(b) => b.health_check().await,
            PlanClient::OpenAICompatible(b) => b.health_check().await,
            PlanClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            PlanClient::Gemini(b) => b.model(),
            PlanClient::OpenAICompatible(b) => b.model(),
            PlanClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            PlanClient::Gemini(b) => b.host(),
            PlanClient::OpenAICompatible(b) => b.host(),
            PlanClient::Mock(b) => b.host(),
        }
    }
}

/// Attempts and backoff for transient provider failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Wait before retry `n` is `base_delay * 2^n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Requests and validates budget plans for profiles
pub struct PlanGenerator<P: PlanProvider = PlanClient> {
    provider: P,
    retry: RetryPolicy,
    temperature: f32,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl<P: PlanProvider> PlanGenerator<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, &PlanConfig::default())
    }

    pub fn with_config(provider: P, config: &PlanConfig) -> Self {
        Self {
            provider,
            retry: config.retry_policy(),
            temperature: config.temperature,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Produce a validated plan for the profile without persisting anything
    ///
    /// Fails before contacting the provider when the allowance is unset or
    /// fully consumed by expenses.
    pub async fn generate(&self, profile: &FinanceProfile) -> Result<ValidatedPlan> {
        if profile.allowance <= Decimal::ZERO {
            return Err(Error::MissingAllowance);
        }
        let request = PlanRequest::from_profile(profile);
        if request.remaining <= Decimal::ZERO {
            return Err(Error::Overspent {
                allowance: request.allowance,
                total_expenses: request.total_expenses,
            });
        }

        let prompt = self.render_prompt(&request)?;
        let response = self.complete_with_retry(profile.id, &prompt).await?;
        debug!(profile_id = profile.id, "Plan provider response: {}", response);

        let plan = parsing::parse_plan(&response)?;
        if let Err(e) = parsing::validate_split(&plan.monthly_split, request.remaining) {
            warn!(profile_id = profile.id, error = %e, "Rejected plan from provider");
            return Err(e);
        }

        info!(
            profile_id = profile.id,
            entertainment = %plan.monthly_split.entertainment,
            savings = %plan.monthly_split.savings,
            "Plan validated"
        );
        Ok(ValidatedPlan {
            plan,
            total_expenses: request.total_expenses,
            remaining: request.remaining,
        })
    }

    fn render_prompt(&self, request: &PlanRequest) -> Result<RenderedPrompt> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::Config("Failed to acquire prompt library lock".into()))?;
        let template = prompts.get(PromptId::BudgetPlan)?;
        Ok(template.render(&request.prompt_vars()))
    }

    async fn complete_with_retry(&self, profile_id: i64, prompt: &RenderedPrompt) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.provider.complete(prompt, self.temperature).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        profile_id,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        model = self.provider.model(),
                        error = %e,
                        "Plan provider unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
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
    use crate::models::{Expense, Goal};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn profile(allowance: Decimal, expenses: &[Decimal]) -> FinanceProfile {
        let mut profile = FinanceProfile::new("Ana", Utc::now());
        profile.allowance = allowance;
        profile.expenses = expenses
            .iter()
            .enumerate()
            .map(|(i, amount)| Expense {
                title: format!("Expense {}", i + 1),
                amount: *amount,
            })
            .collect();
        profile
    }

    fn generator(mock: &MockBackend) -> PlanGenerator<MockBackend> {
        PlanGenerator::new(mock.clone())
            .with_retry(RetryPolicy::immediate(3))
            .with_prompts(PromptLibrary::embedded_only())
    }

    fn split_reply(entertainment: u32, savings: u32) -> MockReply {
        MockReply::Text(format!(
            r#"```json
{{"monthlySplit": {{"entertainment": {}, "savings": {}}}, "savingsPurpose": "Emergency fund", "disciplineRules": []}}
```"#,
            entertainment, savings
        ))
    }

    #[tokio::test]
    async fn test_accepts_balanced_plan() {
        let mock = MockBackend::scripted([split_reply(400, 300)]);
        let validated = generator(&mock)
            .generate(&profile(dec!(1000), &[dec!(300)]))
            .await
            .unwrap();

        assert_eq!(validated.remaining, dec!(700));
        assert_eq!(validated.total_expenses, dec!(300));
        assert_eq!(validated.plan.monthly_split.entertainment, dec!(400));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unbalanced_plan() {
        let mock = MockBackend::scripted([split_reply(500, 300)]);
        let result = generator(&mock)
            .generate(&profile(dec!(1000), &[dec!(300)]))
            .await;

        assert!(matches!(
            result,
            Err(Error::InvalidPlanArithmetic { remaining, .. }) if remaining == dec!(700)
        ));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_allowance_skips_provider() {
        let mock = MockBackend::new();
        let result = generator(&mock).generate(&profile(dec!(0), &[])).await;

        assert!(matches!(result, Err(Error::MissingAllowance)));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_overspent_skips_provider() {
        let mock = MockBackend::new();
        let result = generator(&mock)
            .generate(&profile(dec!(500), &[dec!(300), dec!(200)]))
            .await;

        assert!(matches!(result, Err(Error::Overspent { .. })));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let mock = MockBackend::scripted([
            MockReply::Status(503),
            MockReply::Status(429),
            split_reply(400, 300),
        ]);
        let validated = generator(&mock)
            .generate(&profile(dec!(1000), &[dec!(300)]))
            .await
            .unwrap();

        assert_eq!(validated.plan.monthly_split.savings, dec!(300));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mock = MockBackend::scripted([
            MockReply::Status(503),
            MockReply::Disconnect,
            MockReply::Status(503),
            split_reply(400, 300),
        ]);
        let result = generator(&mock)
            .generate(&profile(dec!(1000), &[dec!(300)]))
            .await;

        assert!(matches!(
            result,
            Err(Error::TransientProvider {
                status: Some(503),
                ..
            })
        ));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_fatal_status_not_retried() {
        let mock = MockBackend::scripted([MockReply::Status(400), split_reply(400, 300)]);
        let result = generator(&mock)
            .generate(&profile(dec!(1000), &[dec!(300)]))
            .await;

        assert!(matches!(
            result,
            Err(Error::Provider {
                status: Some(400),
                ..
            })
        ));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_response_not_retried() {
        let mock = MockBackend::scripted([
            MockReply::Text("Sorry, I can't do budgets".into()),
            split_reply(400, 300),
        ]);
        let result = generator(&mock)
            .generate(&profile(dec!(1000), &[dec!(300)]))
            .await;

        assert!(matches!(result, Err(Error::InvalidPlanFormat(_))));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_lists_goals_by_priority() {
        let mock = MockBackend::new();
        let mut profile = profile(dec!(1000), &[dec!(300)]);
        profile.goals.push(Goal {
            id: Uuid::new_v4(),
            name: "Laptop".into(),
            target_amount: dec!(1200),
            deadline: None,
            estimated_date: None,
        });

        let validated = generator(&mock).generate(&profile).await.unwrap();

        let prompt = mock.last_prompt().unwrap();
        assert!(prompt.user.contains("- Priority 1: Laptop (1200)"));
        assert!(prompt.user.contains("Remaining money: 700"));
        assert_eq!(validated.plan.monthly_split.total(), Some(dec!(700)));
        assert!(validated.plan.goal_plan.is_some());
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
