//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Engine config from `--config` or the default location
//! - `build_engine` - Reconciliation orchestrator over the database
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{bail, Context, Result};
use fley_core::{
    db::Database, EngineConfig, FinanceProfile, PlanClient, ProfileId, ReconciliationOrchestrator,
};

/// Orchestrator as used by the CLI
pub type Engine = ReconciliationOrchestrator<Database, PlanClient>;

/// Profile addressed by ID or by linked chat gateway id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(ProfileId),
    External(String),
}

impl Target {
    /// Load the profile with its ledger caught up
    pub fn read(&self, engine: &Engine) -> Result<FinanceProfile> {
        let profile = match self {
            Target::Id(id) => engine.read_profile(*id)?,
            Target::External(external_id) => engine.read_profile_by_external_id(external_id)?,
        };
        Ok(profile)
    }
}

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let Some(path_str) = db_path.to_str() else {
        bail!("Database path is not valid UTF-8: {}", db_path.display());
    };
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn load_config(config_path: Option<&Path>) -> Result<EngineConfig> {
    EngineConfig::load(config_path).context("Failed to load engine config")
}

/// Build the orchestrator; `provider` is only called by `plan`
pub fn build_engine(db: &Database, config: &EngineConfig, provider: PlanClient) -> Engine {
    ReconciliationOrchestrator::new(db.clone(), provider, config.clone())
}

/// Engine for commands that never reach the plan provider
pub fn offline_engine(db: &Database, config: &EngineConfig) -> Engine {
    build_engine(db, config, PlanClient::mock())
}

/// Plan provider selected by `PLAN_BACKEND`
pub fn plan_client(model: Option<&str>) -> Result<PlanClient> {
    match PlanClient::from_env() {
        Some(client) => Ok(override_model(client, model)),
        None => bail!(
            "No plan provider configured. Set GEMINI_API_KEY, or PLAN_BACKEND=openai_compatible with OPENAI_COMPATIBLE_HOST"
        ),
    }
}

/// Apply a `--model` override, if one was given
pub fn override_model(client: PlanClient, model: Option<&str>) -> PlanClient {
    match model {
        Some(model) => client.with_model(model),
        None => client,
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;
    let profiles = db.count_profiles().context("Failed to read profiles table")?;
    println!("   Profiles: {}", profiles);

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Create a profile: fley onboard --name Ana --allowance 1000 --day 5 --expense Rent=300");
    println!("  2. Generate a plan:  fley plan --profile 1");

    Ok(())
}
