use std::collections::HashMap;

use homescan_core::{CatalogResult, ProfileId};
use parking_lot::RwLock;
use serde::Serialize;
use time::OffsetDateTime;

use crate::scan::ScanReport;

/// What the dashboard shows about a profile's scans.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStatus {
    pub in_progress: bool,
    pub target: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub last_report: Option<ScanReport>,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub(crate) struct ScanBoard {
    entries: RwLock<HashMap<ProfileId, ScanStatus>>,
}

impl ScanBoard {
    fn start(&self, profile_id: ProfileId, target: &str, at: OffsetDateTime) {
        let mut entries = self.entries.write();
        let e = entries.entry(profile_id).or_default();
        e.in_progress = true;
        e.target = Some(target.to_string());
        e.started_at = Some(at);
    }

    /// Like `start`, but the returned entry marks the scan cancelled if it
    /// is dropped before `RunningScan::finish`.
    pub(crate) fn begin(&self, profile_id: ProfileId, target: &str, at: OffsetDateTime) -> RunningScan<'_> {
        self.start(profile_id, target, at);
        RunningScan { board: self, profile_id, settled: false }
    }

    pub(crate) fn finish(&self, profile_id: ProfileId, outcome: &CatalogResult<ScanReport>) {
        let mut entries = self.entries.write();
        let e = entries.entry(profile_id).or_default();
        e.in_progress = false;
        match outcome {
            Ok(report) => {
                e.last_report = Some(report.clone());
                e.last_error = None;
            }
            Err(err) => e.last_error = Some(err.to_string()),
        }
    }

    fn cancel(&self, profile_id: ProfileId) {
        let mut entries = self.entries.write();
        if let Some(e) = entries.get_mut(&profile_id) {
            e.in_progress = false;
            e.last_error = Some("scan cancelled".to_string());
        }
    }

    pub(crate) fn get(&self, profile_id: ProfileId) -> ScanStatus {
        self.entries.read().get(&profile_id).cloned().unwrap_or_default()
    }

    pub(crate) fn remove(&self, profile_id: ProfileId) {
        self.entries.write().remove(&profile_id);
    }
}

pub(crate) struct RunningScan<'a> {
    board: &'a ScanBoard,
    profile_id: ProfileId,
    settled: bool,
}

impl RunningScan<'_> {
    pub(crate) fn finish(mut self, outcome: &CatalogResult<ScanReport>) {
        self.board.finish(self.profile_id, outcome);
        self.settled = true;
    }
}

impl Drop for RunningScan<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.board.cancel(self.profile_id);
        }
    }
}
