use homescan_core::ordering::plan_reorder;
use homescan_core::{CatalogError, CatalogResult, ManualService, ProfileId, Service, ServiceId, ServicePatch};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::engine::ScanEngine;

impl ScanEngine {
    pub fn list_services(&self, profile_id: ProfileId, include_hidden: bool) -> CatalogResult<Vec<Service>> {
        self.store(|db| db.list_services(profile_id, include_hidden))
    }

    fn profile_of(&self, id: ServiceId) -> CatalogResult<ProfileId> {
        Ok(self.store(|db| db.get_service(id))?.profile_id)
    }

    /// Applies a curation patch. Waits for an in-flight scan of the same
    /// profile so the edit is not lost to it.
    pub async fn update_service(&self, id: ServiceId, patch: &ServicePatch) -> CatalogResult<Service> {
        let profile_id = self.profile_of(id)?;
        let _guard = self.locks.acquire(profile_id).await;
        let mut svc = self.store(|db| db.get_service(id))?;
        if patch.is_empty() {
            return Ok(svc);
        }
        patch.apply(&mut svc);
        let saved = self.store(|db| db.save_curation(&svc))?;
        debug!(service_id = id, profile_id, locked = saved.is_manual_lock, "service curated");
        Ok(saved)
    }

    /// Adds a user-defined service at the end of the profile's ordering.
    pub async fn create_manual_service(&self, manual: ManualService) -> CatalogResult<Service> {
        manual.validate()?;
        let profile_id = manual.profile_id;
        self.get_profile(profile_id)?;
        let _guard = self.locks.acquire(profile_id).await;
        let now = OffsetDateTime::now_utc();
        let svc = self.store(move |db| db.insert_manual(profile_id, move |pos| manual.into_new(now, pos)))?;
        info!(service_id = svc.id, profile_id, key = %svc.key(), "manual service added");
        Ok(svc)
    }

    /// The only way a service leaves the catalog.
    pub async fn delete_service(&self, id: ServiceId) -> CatalogResult<Service> {
        let profile_id = self.profile_of(id)?;
        let _guard = self.locks.acquire(profile_id).await;
        let svc = self.store(|db| db.delete_service(id))?;
        info!(service_id = id, profile_id, "service deleted");
        Ok(svc)
    }

    /// Sets `sort_order = index` for each id. `ordered_ids` must be exactly
    /// the profile's services; the profile is inferred from the first id when
    /// not given.
    pub async fn reorder(&self, profile_id: Option<ProfileId>, ordered_ids: &[ServiceId]) -> CatalogResult<()> {
        let profile_id = match (profile_id, ordered_ids.first()) {
            (Some(p), _) => {
                self.get_profile(p)?;
                p
            }
            (None, Some(&first)) => self.profile_of(first).map_err(|e| match e {
                CatalogError::NotFound { id, .. } => CatalogError::InvalidOrdering(format!("unknown service {id}")),
                other => other,
            })?,
            (None, None) => return Err(CatalogError::InvalidOrdering("ordered_ids is empty".into())),
        };
        let _guard = self.locks.acquire(profile_id).await;
        let current = self.store(|db| db.service_ids(profile_id))?;
        let plan = plan_reorder(&current, ordered_ids)?;
        self.store(|db| db.apply_order(profile_id, &plan))?;
        debug!(profile_id, count = plan.len(), "services reordered");
        Ok(())
    }
}
