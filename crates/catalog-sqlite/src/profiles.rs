use homescan_core::{CatalogError, NewProfile, Profile, ProfileId, ProfilePatch, DEFAULT_PROFILE_NAME};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::query::{profile_from_row, PROFILE_COLUMNS};
use crate::{Db, StoreError, StoreResult};

impl Db {
    pub fn list_profiles(&self) -> StoreResult<Vec<Profile>> {
        let mut stmt = self.conn.prepare(&format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY id"))?;
        let rows = stmt.query_map([], profile_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_profile(&self, id: ProfileId) -> StoreResult<Profile> {
        self.conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id=?"),
                [id],
                profile_from_row,
            )
            .optional()?
            .ok_or_else(|| CatalogError::not_found("profile", id).into())
    }

    pub fn guest_default_profile(&self) -> StoreResult<Option<Profile>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE is_guest_default=1"),
                [],
                profile_from_row,
            )
            .optional()?)
    }

    pub fn create_profile(&self, new: &NewProfile) -> StoreResult<Profile> {
        new.validate()?;
        let name = new.name.trim();
        let target = new.scan_target.as_deref().map(str::trim).filter(|t| !t.is_empty());
        self.conn
            .execute(
                "INSERT INTO profiles(name,scan_target,is_guest_default) VALUES (?,?,0)",
                params![name, target],
            )
            .map_err(|e| duplicate_name(e, name))?;
        self.get_profile(self.conn.last_insert_rowid())
    }

    pub fn update_profile(&self, id: ProfileId, patch: &ProfilePatch) -> StoreResult<Profile> {
        patch.validate()?;
        let mut profile = self.get_profile(id)?;
        if let Some(name) = &patch.name {
            profile.name = name.trim().to_string();
        }
        if let Some(target) = &patch.scan_target {
            profile.scan_target = Some(target.trim().to_string()).filter(|t| !t.is_empty());
        }
        self.conn
            .execute(
                "UPDATE profiles SET name=?, scan_target=? WHERE id=?",
                params![profile.name, profile.scan_target, id],
            )
            .map_err(|e| duplicate_name(e, &profile.name))?;
        Ok(profile)
    }

    /// Removes the profile and, through the foreign key, all of its services.
    /// The guest-default profile must be replaced before it can go.
    pub fn delete_profile(&mut self, id: ProfileId) -> StoreResult<Profile> {
        let profile = self.get_profile(id)?;
        if profile.name == DEFAULT_PROFILE_NAME {
            return Err(CatalogError::Conflict("the default profile cannot be deleted".into()).into());
        }
        if profile.is_guest_default {
            return Err(CatalogError::Conflict(format!(
                "profile {id} is the guest default; choose another guest default first"
            ))
            .into());
        }
        let tx = self.conn.transaction()?;
        let services = tx.execute("DELETE FROM services WHERE profile_id=?", [id])?;
        tx.execute("DELETE FROM profiles WHERE id=?", [id])?;
        tx.commit()?;
        debug!(profile_id = id, services, "profile deleted");
        Ok(profile)
    }

    /// Moves the guest-default flag to `id`; every other profile loses it in
    /// the same transaction.
    pub fn set_guest_default(&mut self, id: ProfileId) -> StoreResult<Profile> {
        let tx = self.conn.transaction()?;
        let exists: bool = tx.query_row("SELECT EXISTS(SELECT 1 FROM profiles WHERE id=?)", [id], |r| r.get(0))?;
        if !exists {
            return Err(CatalogError::not_found("profile", id).into());
        }
        tx.execute("UPDATE profiles SET is_guest_default=0 WHERE is_guest_default=1 AND id<>?", [id])?;
        tx.execute("UPDATE profiles SET is_guest_default=1 WHERE id=?", [id])?;
        tx.commit()?;
        self.get_profile(id)
    }
}

fn duplicate_name(err: rusqlite::Error, name: &str) -> StoreError {
    let err = StoreError::from(err);
    if err.is_unique_violation() {
        CatalogError::Conflict(format!("a profile named {name:?} already exists")).into()
    } else {
        err
    }
}
