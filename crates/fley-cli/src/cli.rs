//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::commands::Target;

/// Fley - Allowance budgeting with a savings ledger that keeps itself current
#[derive(Parser)]
#[command(name = "fley")]
#[command(about = "Student allowance budgeting and savings tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "fley.db", global = true)]
    pub db: PathBuf,

    /// Engine config file (defaults to ~/.config/fley/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set FLEY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which profile a command acts on
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ProfileSelector {
    /// Profile ID
    #[arg(long)]
    pub profile: Option<i64>,

    /// Chat gateway id linked to the profile
    #[arg(long)]
    pub external: Option<String>,
}

impl ProfileSelector {
    pub fn into_target(self) -> anyhow::Result<Target> {
        match (self.profile, self.external) {
            (Some(id), _) => Ok(Target::Id(id)),
            (None, Some(external_id)) => Ok(Target::External(external_id)),
            (None, None) => anyhow::bail!("Specify --profile or --external"),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Create a profile, or re-submit onboarding for an existing one
    ///
    /// Re-submitting replaces expenses and goals and clears the cached plan;
    /// the savings ledger is kept.
    Onboard {
        /// Profile name (required when creating)
        #[arg(short, long)]
        name: Option<String>,

        /// Existing profile to update
        #[arg(long)]
        profile: Option<i64>,

        /// Monthly allowance
        #[arg(short, long)]
        allowance: Decimal,

        /// Day of month the allowance arrives (1-31)
        #[arg(short, long, default_value = "1")]
        day: u32,

        /// Recurring expense as Title=Amount (repeatable)
        #[arg(short, long = "expense")]
        expenses: Vec<String>,

        /// Goal as Name=Target in priority order (repeatable)
        #[arg(short, long = "goal")]
        goals: Vec<String>,
    },

    /// List profiles, or show one profile in detail
    Profile {
        /// Profile ID
        #[arg(long)]
        profile: Option<i64>,

        /// Chat gateway id linked to the profile
        #[arg(long, conflicts_with = "profile")]
        external: Option<String>,

        /// Print the stored document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a budget plan with the configured provider
    Plan {
        #[command(flatten)]
        target: ProfileSelector,

        /// Model to use instead of the backend's configured one
        #[arg(long)]
        model: Option<String>,
    },

    /// Record a variable expense against the entertainment budget
    Spend {
        /// Amount spent
        amount: Decimal,

        /// What the money went on
        #[arg(default_value = "Expense")]
        title: String,

        #[command(flatten)]
        target: ProfileSelector,
    },

    /// Show entertainment budget and savings
    Balance {
        #[command(flatten)]
        target: ProfileSelector,
    },

    /// Show spending totals and goals
    Stats {
        #[command(flatten)]
        target: ProfileSelector,
    },

    /// Project savings forward using the plan's monthly savings
    Project {
        #[command(flatten)]
        target: ProfileSelector,

        /// Months to project
        #[arg(short, long, default_value = "12")]
        months: u32,
    },

    /// Link a chat gateway id to a profile
    Link {
        /// Profile ID
        #[arg(long)]
        profile: i64,

        /// External id to link
        external_id: String,
    },

    /// Export profile data as CSV
    Export {
        /// What to export
        #[arg(value_enum)]
        kind: ExportKind,

        #[command(flatten)]
        target: ProfileSelector,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the configured plan provider and check it is reachable
    Provider {
        /// Model to check instead of the backend's configured one
        #[arg(long)]
        model: Option<String>,
    },

    /// Show database and configuration status
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    /// Savings ledger checkpoints
    Ledger,
    /// Variable expenses
    Spends,
}
