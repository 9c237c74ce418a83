//! Fley CLI - Allowance budgeting and savings tracker
//!
//! Usage:
//!   fley init                                   Initialize database
//!   fley onboard --name Ana --allowance 1000    Create a profile
//!   fley plan --profile 1                       Generate a budget plan
//!   fley spend 12.50 Pizza --external tg-42     Record a spend

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, config_path, cli.no_encrypt),
        Commands::Provider { model } => commands::cmd_provider(model.as_deref()).await,
        Commands::Onboard {
            name,
            profile,
            allowance,
            day,
            expenses,
            goals,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_onboard(
                &db,
                &config,
                name.as_deref(),
                profile,
                allowance,
                day,
                &expenses,
                &goals,
            )
            .map(|_| ())
        }
        Commands::Profile {
            profile,
            external,
            json,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let target = match (profile, external) {
                (Some(id), _) => commands::Target::Id(id),
                (None, Some(external_id)) => commands::Target::External(external_id),
                (None, None) => return commands::cmd_profile_list(&db),
            };
            let config = commands::load_config(config_path)?;
            commands::cmd_profile_show(&db, &config, &target, json)
        }
        Commands::Plan { target, model } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            let provider = commands::plan_client(model.as_deref())?;
            commands::cmd_plan(&db, &config, provider, &target.into_target()?).await
        }
        Commands::Spend {
            amount,
            title,
            target,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_spend(&db, &config, &target.into_target()?, amount, &title).map(|_| ())
        }
        Commands::Balance { target } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_balance(&db, &config, &target.into_target()?)
        }
        Commands::Stats { target } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_stats(&db, &config, &target.into_target()?)
        }
        Commands::Project { target, months } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_project(&db, &config, &target.into_target()?, months)
        }
        Commands::Link {
            profile,
            external_id,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_link(&db, &config, profile, &external_id)
        }
        Commands::Export {
            kind,
            target,
            output,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(config_path)?;
            commands::cmd_export(&db, &config, &target.into_target()?, kind, output.as_deref())
                .map(|_| ())
        }
    }
}
