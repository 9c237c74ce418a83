//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_db, load_config, build_engine) and init
//! - `profile` - Onboarding, profile listing/detail, external id linking
//! - `budget` - Plan generation, spends, balance, stats, projection
//! - `export` - CSV export of the savings ledger and spends
//! - `status` - Database/config status and provider check

pub mod budget;
pub mod core;
pub mod export;
pub mod profile;
pub mod status;

// Re-export command functions for main.rs
pub use budget::*;
pub use core::*;
pub use export::*;
pub use profile::*;
pub use status::*;

/// Format a money amount with two decimals
pub fn money(amount: rust_decimal::Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
