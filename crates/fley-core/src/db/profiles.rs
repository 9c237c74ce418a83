//! Profile document storage

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{FinanceProfile, ProfileId};
use crate::store::ProfileStore;

/// Listing entry for a stored profile
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: ProfileId,
    pub name: String,
    pub external_link_id: Option<String>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

fn profile_from_row(row: &Row) -> rusqlite::Result<(ProfileId, u64, String)> {
    Ok((row.get(0)?, row.get::<_, i64>(1)? as u64, row.get(2)?))
}

fn decode(id: ProfileId, version: u64, document: &str) -> Result<FinanceProfile> {
    let mut profile: FinanceProfile = serde_json::from_str(document)?;
    profile.id = id;
    profile.version = version;
    Ok(profile)
}

/// Turn a unique constraint failure on the link column into a validation error
fn map_link_conflict(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(e, _) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            return Error::Validation("external id is already linked to another profile".into());
        }
    }
    Error::Database(err)
}

impl Database {
    /// All profiles, most recently updated first
    pub fn list_profiles(&self) -> Result<Vec<ProfileRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, external_link_id, version, updated_at
             FROM profiles ORDER BY updated_at DESC, id DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, name, external_link_id, version, updated_at)| {
                let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::Validation(format!("bad timestamp on profile {}: {}", id, e)))?;
                Ok(ProfileRow {
                    id,
                    name,
                    external_link_id,
                    version: version as u64,
                    updated_at,
                })
            })
            .collect()
    }

    pub fn count_profiles(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?)
    }
}

impl ProfileStore for Database {
    fn create(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
        let conn = self.conn()?;
        let mut stored = profile.clone();
        stored.version = 1;
        let document = serde_json::to_string(&stored)?;

        conn.execute(
            "INSERT INTO profiles (name, external_link_id, version, document, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?4, ?5)",
            params![
                stored.name,
                stored.external_link_id,
                document,
                stored.created_at.to_rfc3339(),
                stored.updated_at.to_rfc3339(),
            ],
        )
        .map_err(map_link_conflict)?;

        stored.id = conn.last_insert_rowid();
        debug!(profile_id = stored.id, "Profile created");
        Ok(stored)
    }

    fn find_by_id(&self, id: ProfileId) -> Result<Option<FinanceProfile>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, version, document FROM profiles WHERE id = ?",
                [id],
                profile_from_row,
            )
            .optional()?;
        row.map(|(id, version, document)| decode(id, version, &document))
            .transpose()
    }

    fn find_by_external_link_id(&self, external_id: &str) -> Result<Option<FinanceProfile>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, version, document FROM profiles WHERE external_link_id = ?",
                [external_id],
                profile_from_row,
            )
            .optional()?;
        row.map(|(id, version, document)| decode(id, version, &document))
            .transpose()
    }

    fn save(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
        let conn = self.conn()?;
        let mut stored = profile.clone();
        stored.version = profile.version + 1;
        stored.updated_at = Utc::now();
        let document = serde_json::to_string(&stored)?;

        let updated = conn
            .execute(
                "UPDATE profiles
                 SET name = ?1, external_link_id = ?2, version = ?3, document = ?4, updated_at = ?5
                 WHERE id = ?6 AND version = ?7",
                params![
                    stored.name,
                    stored.external_link_id,
                    stored.version as i64,
                    document,
                    stored.updated_at.to_rfc3339(),
                    profile.id,
                    profile.version as i64,
                ],
            )
            .map_err(map_link_conflict)?;

        if updated == 0 {
            let current: Option<i64> = conn
                .query_row(
                    "SELECT version FROM profiles WHERE id = ?",
                    [profile.id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match current {
                None => Error::NotFound(format!("profile {}", profile.id)),
                Some(version) => Error::Conflict(format!(
                    "profile {} is at version {}, update was based on {}",
                    profile.id, version, profile.version
                )),
            });
        }

        Ok(stored)
    }
}
