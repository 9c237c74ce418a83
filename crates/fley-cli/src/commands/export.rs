//! Export command implementation

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use fley_core::{db::Database, export, EngineConfig, FinanceProfile};

use super::{offline_engine, Target};
use crate::cli::ExportKind;

pub fn cmd_export(
    db: &Database,
    config: &EngineConfig,
    target: &Target,
    kind: ExportKind,
    output: Option<&Path>,
) -> Result<usize> {
    let engine = offline_engine(db, config);
    let profile = target.read(&engine)?;

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let rows = write_export(&profile, kind, file)?;
            println!("✅ Exported {} rows to {}", rows, path.display());
            Ok(rows)
        }
        None => write_export(&profile, kind, std::io::stdout().lock()),
    }
}

fn write_export<W: Write>(profile: &FinanceProfile, kind: ExportKind, out: W) -> Result<usize> {
    let rows = match kind {
        ExportKind::Ledger => export::export_ledger(profile, out)?,
        ExportKind::Spends => export::export_spends(profile, out)?,
    };
    Ok(rows)
}
