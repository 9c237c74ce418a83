//! Mock plan provider for testing and offline use
//!
//! With nothing scripted it answers every request with a balanced plan: 40%
//! of the remaining money to entertainment, the rest to savings. Tests can
//! queue exact replies, including transient and fatal failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::prompts::RenderedPrompt;

use super::PlanProvider;

/// One scripted provider reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Raw response text
    Text(String),
    /// Fail with this HTTP status (classified like a real backend would)
    Status(u16),
    /// Fail as a dropped connection
    Disconnect,
}

#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    script: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<AtomicUsize>,
    last_prompt: Arc<Mutex<Option<RenderedPrompt>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Create a mock that plays back `replies` in order, then falls back to the default plan
    pub fn scripted(replies: impl IntoIterator<Item = MockReply>) -> Self {
        let backend = Self::new();
        backend.push_replies(replies);
        backend
    }

    pub fn push_replies(&self, replies: impl IntoIterator<Item = MockReply>) {
        if let Ok(mut script) = self.script.lock() {
            script.extend(replies);
        }
    }

    /// Number of completion requests received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The prompt of the most recent request
    pub fn last_prompt(&self) -> Option<RenderedPrompt> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    /// No-op for mock
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }

    fn default_reply(prompt: &RenderedPrompt) -> Result<String> {
        let remaining = prompt
            .user
            .lines()
            .find_map(|line| line.trim().strip_prefix("Remaining money:"))
            .and_then(|v| v.trim().parse::<Decimal>().ok())
            .ok_or_else(|| {
                Error::InvalidPlanFormat("mock could not find the remaining amount".into())
            })?;

        let entertainment = (remaining * Decimal::new(4, 1)).round_dp(2);
        let savings = remaining - entertainment;
        let has_goal = prompt.user.contains("Priority 1:");

        let detail = if has_goal {
            format!(
                r#""goalPlan": {{"goal": "top priority goal", "monthlySaving": {}, "monthsNeeded": 6}}"#,
                savings
            )
        } else {
            r#""savingsPurpose": "Emergency fund""#.to_string()
        };
        let plan = format!(
            r#"{{"monthlySplit": {{"entertainment": {}, "savings": {}}}, {}, "disciplineRules": ["Track every spend the day it happens"]}}"#,
            entertainment, savings, detail
        );
        Ok(format!("```json\n{}\n```", plan))
    }
}

#[async_trait]
impl PlanProvider for MockBackend {
    async fn complete(&self, prompt: &RenderedPrompt, _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.clone());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Status(status)) => Err(Error::from_provider_status(
                status,
                format!("mock status {}", status),
            )),
            Some(MockReply::Disconnect) => Err(Error::TransientProvider {
                status: None,
                message: "mock connection reset".into(),
            }),
            None => Self::default_reply(prompt),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
