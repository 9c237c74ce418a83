//! Profile persistence interface
//!
//! A store keeps whole [`FinanceProfile`] documents. Writes are guarded by the
//! profile's `version`: [`ProfileStore::save`] only succeeds when the stored
//! version still equals the version the caller loaded, so two flows racing on
//! the same profile cannot silently overwrite each other.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{FinanceProfile, ProfileId};

pub trait ProfileStore: Send + Sync {
    /// Insert a new profile; the returned copy carries the assigned id and version 1
    fn create(&self, profile: &FinanceProfile) -> Result<FinanceProfile>;

    fn find_by_id(&self, id: ProfileId) -> Result<Option<FinanceProfile>>;

    fn find_by_external_link_id(&self, external_id: &str) -> Result<Option<FinanceProfile>>;

    /// Replace the stored document if its version matches `profile.version`
    ///
    /// Returns the stored copy with the incremented version. Fails with
    /// [`Error::Conflict`] when another writer got there first and
    /// [`Error::NotFound`] when the profile does not exist.
    fn save(&self, profile: &FinanceProfile) -> Result<FinanceProfile>;
}

/// In-memory store for tests and embedding
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_id: ProfileId,
    profiles: HashMap<ProfileId, FinanceProfile>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Conflict("profile store lock poisoned".into()))
    }
}

fn link_taken(inner: &MemoryInner, profile: &FinanceProfile) -> bool {
    profile.external_link_id.as_ref().is_some_and(|ext| {
        inner
            .profiles
            .values()
            .any(|p| p.id != profile.id && p.external_link_id.as_ref() == Some(ext))
    })
}

impl ProfileStore for MemoryStore {
    fn create(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let mut stored = profile.clone();
        stored.id = inner.next_id;
        stored.version = 1;
        if link_taken(&inner, &stored) {
            return Err(Error::Validation(
                "external id is already linked to another profile".into(),
            ));
        }
        inner.profiles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn find_by_id(&self, id: ProfileId) -> Result<Option<FinanceProfile>> {
        Ok(self.lock()?.profiles.get(&id).cloned())
    }

    fn find_by_external_link_id(&self, external_id: &str) -> Result<Option<FinanceProfile>> {
        Ok(self
            .lock()?
            .profiles
            .values()
            .find(|p| p.external_link_id.as_deref() == Some(external_id))
            .cloned())
    }

    fn save(&self, profile: &FinanceProfile) -> Result<FinanceProfile> {
        let mut inner = self.lock()?;
        let current = inner
            .profiles
            .get(&profile.id)
            .ok_or_else(|| Error::NotFound(format!("profile {}", profile.id)))?;
        if current.version != profile.version {
            return Err(Error::Conflict(format!(
                "profile {} is at version {}, update was based on {}",
                profile.id, current.version, profile.version
            )));
        }
        if link_taken(&inner, profile) {
            return Err(Error::Validation(
                "external id is already linked to another profile".into(),
            ));
        }
        let mut stored = profile.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();
        inner.profiles.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_assigns_ids() {
        let store = MemoryStore::new();
        let a = store.create(&FinanceProfile::new("A", Utc::now())).unwrap();
        let b = store.create(&FinanceProfile::new("B", Utc::now())).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.version, 1);
        assert_eq!(store.find_by_id(a.id).unwrap().unwrap().name, "A");
        assert!(store.find_by_id(999).unwrap().is_none());
    }

    #[test]
    fn test_stale_save_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(&FinanceProfile::new("A", Utc::now())).unwrap();

        let mut first = created.clone();
        first.name = "First".into();
        let saved = store.save(&first).unwrap();
        assert_eq!(saved.version, 2);

        let mut second = created;
        second.name = "Second".into();
        assert!(matches!(store.save(&second), Err(Error::Conflict(_))));
        assert_eq!(store.find_by_id(saved.id).unwrap().unwrap().name, "First");
    }

    #[test]
    fn test_save_unknown_profile() {
        let store = MemoryStore::new();
        let mut ghost = FinanceProfile::new("Ghost", Utc::now());
        ghost.id = 42;
        assert!(matches!(store.save(&ghost), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_external_link_lookup_and_uniqueness() {
        let store = MemoryStore::new();
        let mut a = store.create(&FinanceProfile::new("A", Utc::now())).unwrap();
        let mut b = store.create(&FinanceProfile::new("B", Utc::now())).unwrap();

        a.external_link_id = Some("chat-1".into());
        store.save(&a).unwrap();
        assert_eq!(
            store.find_by_external_link_id("chat-1").unwrap().unwrap().id,
            a.id
        );

        b.external_link_id = Some("chat-1".into());
        assert!(matches!(store.save(&b), Err(Error::Validation(_))));
    }
}
