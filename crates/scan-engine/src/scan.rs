use homescan_core::{reconcile, CatalogError, CatalogResult, ProfileId, Target};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::engine::ScanEngine;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub profile_id: ProfileId,
    pub target: String,
    pub detected: usize,
    pub inserted: usize,
    pub updated: usize,
    pub locked: usize,
    pub untouched: usize,
    pub rejected: usize,
    pub total: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl ScanEngine {
    /// Detects services on `target` (or the profile's default target) and
    /// merges them into the profile's catalog.
    ///
    /// Fails fast with `ScanInProgress` when the profile is busy. A detector
    /// error or timeout aborts the scan before anything is written.
    #[instrument(skip(self), fields(detector = self.detector.name()))]
    pub async fn trigger_scan(&self, profile_id: ProfileId, target: Option<&str>) -> CatalogResult<ScanReport> {
        let profile = self.get_profile(profile_id)?;
        let target_text = target
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or(profile.scan_target)
            .ok_or_else(|| CatalogError::Validation(format!("profile {profile_id} has no scan target")))?;
        let target: Target = target_text.parse()?;

        let Some(_guard) = self.locks.try_acquire(profile_id) else {
            warn!(profile_id, "scan rejected, profile busy");
            return Err(CatalogError::ScanInProgress(profile_id));
        };

        let started_at = OffsetDateTime::now_utc();
        let entry = self.board.begin(profile_id, &target.to_string(), started_at);
        let outcome = self.run_scan(profile_id, &target, started_at).await;
        entry.finish(&outcome);
        match &outcome {
            Ok(r) => info!(
                profile_id,
                %target,
                detected = r.detected,
                inserted = r.inserted,
                updated = r.updated,
                locked = r.locked,
                untouched = r.untouched,
                "scan finished"
            ),
            Err(e) => warn!(profile_id, %target, error = %e, "scan aborted, catalog unchanged"),
        }
        outcome
    }

    async fn run_scan(&self, profile_id: ProfileId, target: &Target, started_at: OffsetDateTime) -> CatalogResult<ScanReport> {
        let limit = self.config.scan_timeout;
        // Dropping the detector future on timeout is the cancellation.
        let detected = match tokio::time::timeout(limit, self.detector.detect(target)).await {
            Err(_) => return Err(CatalogError::Timeout(limit)),
            Ok(Err(e)) => return Err(CatalogError::DetectorUnavailable(e.to_string())),
            Ok(Ok(found)) => found,
        };

        let now = OffsetDateTime::now_utc();
        let (stats, total) = self.store(|db| {
            let existing = db.list_services(profile_id, true)?;
            let rec = reconcile(&existing, &detected, profile_id, now)?;
            let catalog = db.replace_catalog(profile_id, &rec)?;
            Ok((rec.stats, catalog.len()))
        })?;
        if stats.rejected > 0 {
            warn!(profile_id, %target, rejected = stats.rejected, "dropped malformed detector tuples");
        }

        Ok(ScanReport {
            profile_id,
            target: target.to_string(),
            detected: detected.len(),
            inserted: stats.inserted,
            updated: stats.updated,
            locked: stats.locked,
            untouched: stats.untouched,
            rejected: stats.rejected,
            total,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
        })
    }
}
