//! Engine configuration
//!
//! Loaded with a three-layer resolution:
//! 1. Explicit path (`--config`), or ~/.config/fley/config.toml when present
//! 2. Embedded defaults (config/engine.toml, compiled into binary)
//! 3. `FLEY_*` environment variables applied on top

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::goals::GoalMergeStrategy;
use crate::plan::RetryPolicy;
use crate::spend::DeficitPolicy;

const DEFAULT_CONFIG: &str = include_str!("../../../config/engine.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct PlanConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub temperature: f32,
}

impl PlanConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub deficit_policy: DeficitPolicy,
    pub refill_entertainment_on_rollover: bool,
    pub goal_merge: GoalMergeStrategy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            deficit_policy: DeficitPolicy::Discard,
            refill_entertainment_on_rollover: true,
            goal_merge: GoalMergeStrategy::ByIdentity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub max_save_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_save_attempts: 5,
        }
    }
}

/// All tunables of the reconciliation engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub plan: PlanConfig,
    pub ledger: LedgerConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load from `path` (or the default location), then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read config {}: {}", path.display(), e))
            })?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(default_path) => fs::read_to_string(&default_path)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?,
                None => DEFAULT_CONFIG.to_string(),
            },
        };

        let mut config = parse_config(&content)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `FLEY_*` overrides using `lookup` to read variables
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("FLEY_PLAN_MAX_ATTEMPTS") {
            self.plan.max_attempts = parse_number("FLEY_PLAN_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("FLEY_PLAN_BASE_DELAY_MS") {
            self.plan.base_delay_ms = parse_number("FLEY_PLAN_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("FLEY_DEFICIT_POLICY") {
            self.ledger.deficit_policy = v.parse()?;
        }
        if let Some(v) = lookup("FLEY_GOAL_MERGE") {
            self.ledger.goal_merge = v.parse()?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.plan.max_attempts == 0 {
            return Err(Error::Config("plan.max_attempts must be at least 1".into()));
        }
        if self.store.max_save_attempts == 0 {
            return Err(Error::Config("store.max_save_attempts must be at least 1".into()));
        }
        if !(0.0..=2.0).contains(&self.plan.temperature) {
            return Err(Error::Config(format!(
                "plan.temperature must be between 0 and 2, got {}",
                self.plan.temperature
            )));
        }
        Ok(())
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fley").join("config.toml"))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, value)))
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    plan: Option<RawPlan>,
    ledger: Option<RawLedger>,
    store: Option<RawStore>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawLedger {
    deficit_policy: Option<DeficitPolicy>,
    refill_entertainment_on_rollover: Option<bool>,
    goal_merge: Option<GoalMergeStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawStore {
    max_save_attempts: Option<u32>,
}

fn parse_config(content: &str) -> Result<EngineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = EngineConfig::default();

    if let Some(plan) = raw.plan {
        if let Some(v) = plan.max_attempts {
            config.plan.max_attempts = v;
        }
        if let Some(v) = plan.base_delay_ms {
            config.plan.base_delay_ms = v;
        }
        if let Some(v) = plan.temperature {
            config.plan.temperature = v;
        }
    }
    if let Some(ledger) = raw.ledger {
        if let Some(v) = ledger.deficit_policy {
            config.ledger.deficit_policy = v;
        }
        if let Some(v) = ledger.refill_entertainment_on_rollover {
            config.ledger.refill_entertainment_on_rollover = v;
        }
        if let Some(v) = ledger.goal_merge {
            config.ledger.goal_merge = v;
        }
    }
    if let Some(store) = raw.store {
        if let Some(v) = store.max_save_attempts {
            config.store.max_save_attempts = v;
        }
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_embedded_default_matches_code_defaults() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
[ledger]
deficit_policy = "defer"
"#,
        )
        .unwrap();
        assert_eq!(config.ledger.deficit_policy, DeficitPolicy::Defer);
        assert_eq!(config.plan.max_attempts, 3);
        assert_eq!(config.store.max_save_attempts, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            parse_config("[ledger]\ndeficit_policy = \"ignore\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            parse_config("[plan]\nmax_attempts = 0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("FLEY_PLAN_MAX_ATTEMPTS", "5"),
            ("FLEY_PLAN_BASE_DELAY_MS", "0"),
            ("FLEY_DEFICIT_POLICY", "reject"),
            ("FLEY_GOAL_MERGE", "positional"),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.plan.max_attempts, 5);
        assert_eq!(config.plan.retry_policy().base_delay, Duration::ZERO);
        assert_eq!(config.ledger.deficit_policy, DeficitPolicy::Reject);
        assert_eq!(config.ledger.goal_merge, GoalMergeStrategy::Positional);
    }

    #[test]
    fn test_bad_env_number() {
        let mut config = EngineConfig::default();
        let result = config.apply_env_with(|k| {
            (k == "FLEY_PLAN_MAX_ATTEMPTS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store]\nmax_save_attempts = 2\n").unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store.max_save_attempts, 2);

        let missing = EngineConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(missing, Err(Error::Config(_))));
    }
}
