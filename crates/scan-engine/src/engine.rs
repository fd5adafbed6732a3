use std::sync::Arc;
use std::time::Duration;

use catalog_sqlite::{Db, StoreResult};
use homescan_core::{
    AppSettings, CatalogError, CatalogResult, Detector, NewProfile, Profile, ProfileId, ProfilePatch, SettingsPatch,
};
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::locks::ProfileLocks;
use crate::status::{ScanBoard, ScanStatus};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on one detector invocation.
    pub scan_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { scan_timeout: Duration::from_secs(120) }
    }
}

pub struct ScanEngine {
    db: Mutex<Db>,
    pub(crate) detector: Arc<dyn Detector>,
    pub(crate) locks: ProfileLocks,
    pub(crate) board: ScanBoard,
    settings: RwLock<AppSettings>,
    pub(crate) config: EngineConfig,
}

impl ScanEngine {
    pub fn new(db: Db, detector: Arc<dyn Detector>, config: EngineConfig) -> CatalogResult<Self> {
        let settings = db.load_settings()?;
        Ok(ScanEngine {
            db: Mutex::new(db),
            detector,
            locks: ProfileLocks::default(),
            board: ScanBoard::default(),
            settings: RwLock::new(settings),
            config,
        })
    }

    /// Runs `f` against the store. Never call across an `.await`.
    pub(crate) fn store<T>(&self, f: impl FnOnce(&mut Db) -> StoreResult<T>) -> CatalogResult<T> {
        let mut db = self.db.lock();
        f(&mut *db).map_err(CatalogError::from)
    }

    pub fn scan_status(&self, profile_id: ProfileId) -> CatalogResult<ScanStatus> {
        self.store(|db| db.get_profile(profile_id))?;
        Ok(self.board.get(profile_id))
    }

    // --- profiles ---

    /// All profiles, or only the guest-default one for anonymous callers.
    pub fn list_profiles(&self, include_all: bool) -> CatalogResult<Vec<Profile>> {
        if include_all {
            self.store(|db| db.list_profiles())
        } else {
            Ok(self.store(|db| db.guest_default_profile())?.into_iter().collect())
        }
    }

    pub fn get_profile(&self, id: ProfileId) -> CatalogResult<Profile> {
        self.store(|db| db.get_profile(id))
    }

    pub fn create_profile(&self, new: &NewProfile) -> CatalogResult<Profile> {
        let profile = self.store(|db| db.create_profile(new))?;
        info!(profile_id = profile.id, name = %profile.name, "profile created");
        Ok(profile)
    }

    pub fn update_profile(&self, id: ProfileId, patch: &ProfilePatch) -> CatalogResult<Profile> {
        self.store(|db| db.update_profile(id, patch))
    }

    /// Waits for any in-flight scan or edit of the profile, then deletes it
    /// together with its services.
    pub async fn delete_profile(&self, id: ProfileId) -> CatalogResult<Profile> {
        self.get_profile(id)?;
        let guard = self.locks.acquire(id).await;
        let deleted = self.store(|db| db.delete_profile(id));
        drop(guard);
        if deleted.is_ok() {
            self.board.remove(id);
            self.locks.forget_if_idle(id);
            info!(profile_id = id, "profile deleted");
        }
        deleted
    }

    pub fn set_guest_default(&self, id: ProfileId) -> CatalogResult<Profile> {
        let profile = self.store(|db| db.set_guest_default(id))?;
        info!(profile_id = id, "guest default profile changed");
        Ok(profile)
    }

    // --- settings ---

    pub fn settings(&self) -> AppSettings {
        self.settings.read().clone()
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> CatalogResult<AppSettings> {
        let mut current = self.settings.write();
        let next = patch.apply(&current)?;
        let saved = self.store(|db| db.save_settings(&next))?;
        *current = saved.clone();
        Ok(saved)
    }
}
