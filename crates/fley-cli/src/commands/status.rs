//! Status-related command implementations (status, provider)

use std::path::Path;

use anyhow::Result;
use fley_core::config::default_config_path;
use fley_core::{PlanClient, PlanProvider};

use super::{load_config, open_db, override_model};

pub fn cmd_status(db_path: &Path, config_path: Option<&Path>, no_encrypt: bool) -> Result<()> {
    use fley_core::db::DB_KEY_ENV;
    use std::fs;

    println!();
    println!("📊 Fley Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(count) = db.count_profiles() {
                    println!();
                    println!("   Profiles: {}", count);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    println!();
    let source = match config_path {
        Some(path) => path.display().to_string(),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => path.display().to_string(),
            None => "(built-in defaults)".to_string(),
        },
    };
    println!("   Config: {}", source);
    match load_config(config_path) {
        Ok(config) => {
            println!(
                "   Plan retries: {} attempts, {} ms base delay",
                config.plan.max_attempts, config.plan.base_delay_ms
            );
            println!("   Deficit policy: {}", config.ledger.deficit_policy);
            println!("   Goal merge: {}", config.ledger.goal_merge);
        }
        Err(e) => println!("   ❌ {:#}", e),
    }

    match PlanClient::from_env() {
        Some(client) => println!("   Plan provider: {} ({})", client.kind(), client.model()),
        None => println!("   Plan provider: not configured"),
    }

    println!();
    Ok(())
}

pub async fn cmd_provider(model: Option<&str>) -> Result<()> {
    let Some(client) = PlanClient::from_env() else {
        println!("❌ No plan provider configured");
        println!();
        println!("   💡 Tip: Set GEMINI_API_KEY to use Gemini");
        println!("   💡 Tip: Set PLAN_BACKEND=openai_compatible and OPENAI_COMPATIBLE_HOST");
        println!("          for a local OpenAI-compatible server");
        return Ok(());
    };
    let client = override_model(client, model);

    println!("🤖 Plan provider");
    println!("   Backend: {}", client.kind());
    println!("   Host:    {}", client.host());
    println!("   Model:   {}", client.model());

    if client.health_check().await {
        println!("   ✅ Reachable");
    } else {
        println!("   ❌ Not reachable (check host and API key)");
    }
    Ok(())
}
