//! Merging detector output into a profile's catalog.
//!
//! Field ownership:
//! - detector owned: `title`, `url`, `protocol`; written on unlocked rows only
//! - user owned: `custom_name`, `lan_url`, `wan_url`, `icon_url`,
//!   `is_visible`, `is_manual_lock`, `sort_order`; never written here
//! - `last_scanned`: refreshed whenever the key is observed, locked or not
//!
//! Rows the scan did not observe are carried over untouched. Nothing here
//! deletes a row. Malformed detected tuples are dropped and counted.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::CatalogError;
use crate::model::{DetectedService, NaturalKey, NewService, ProfileId, Service};
use crate::ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub inserted: usize,
    pub updated: usize,
    pub locked: usize,
    pub untouched: usize,
    /// Detected tuples dropped for a malformed address, port or protocol.
    pub rejected: usize,
}

/// Desired post-scan catalog: every existing row (possibly updated) plus
/// rows to create, positioned after the existing ones.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub retained: Vec<Service>,
    pub inserted: Vec<NewService>,
    pub stats: ReconcileStats,
}

pub fn reconcile(
    existing: &[Service],
    detected: &[DetectedService],
    profile_id: ProfileId,
    now: OffsetDateTime,
) -> Result<Reconciliation, CatalogError> {
    let mut index: HashMap<NaturalKey, usize> = HashMap::with_capacity(existing.len());
    for (i, svc) in existing.iter().enumerate() {
        if svc.profile_id != profile_id {
            return Err(CatalogError::Conflict(format!(
                "service {} belongs to profile {}, not {profile_id}",
                svc.id, svc.profile_id
            )));
        }
        if index.insert(svc.key(), i).is_some() {
            return Err(CatalogError::Conflict(format!("duplicate catalog entry for {}", svc.key())));
        }
    }
    ordering::ensure_dense(existing.iter().map(|s| s.sort_order))?;

    let mut retained = existing.to_vec();
    let mut stats = ReconcileStats::default();
    let mut seen: HashSet<NaturalKey> = HashSet::with_capacity(detected.len());
    let mut fresh: Vec<&DetectedService> = Vec::new();

    for tuple in detected {
        let Ok(key) = tuple.validate() else {
            stats.rejected += 1;
            continue;
        };
        // First occurrence of a key wins within one detector run.
        if !seen.insert(key.clone()) {
            continue;
        }
        match index.get(&key) {
            Some(&i) => {
                let row = &mut retained[i];
                row.last_scanned = now;
                if row.is_manual_lock {
                    stats.locked += 1;
                } else {
                    apply_detector_fields(row, tuple, &key);
                    stats.updated += 1;
                }
            }
            None => fresh.push(tuple),
        }
    }
    stats.untouched = existing.len() - stats.updated - stats.locked;

    let positions = ordering::append_positions(existing.iter().map(|s| s.sort_order), fresh.len());
    let inserted: Vec<NewService> = fresh
        .into_iter()
        .zip(positions)
        .map(|(tuple, pos)| NewService::discovered(profile_id, tuple, now, pos))
        .collect();
    stats.inserted = inserted.len();

    ordering::ensure_dense(
        retained
            .iter()
            .map(|s| s.sort_order)
            .chain(inserted.iter().map(|s| s.sort_order)),
    )?;

    Ok(Reconciliation { retained, inserted, stats })
}

fn apply_detector_fields(row: &mut Service, tuple: &DetectedService, key: &NaturalKey) {
    let title = tuple.title.trim();
    if !title.is_empty() {
        row.title = title.to_string();
    }
    row.protocol = key.protocol.clone();
    row.url = Some(key.url());
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);
    const T1: OffsetDateTime = datetime!(2024-01-02 00:00 UTC);
    const T2: OffsetDateTime = datetime!(2024-01-03 00:00 UTC);

    fn row(id: i64, ip: &str, port: u16, protocol: &str, title: &str, order: i64) -> Service {
        Service {
            id,
            profile_id: 1,
            ip: ip.into(),
            port,
            protocol: protocol.into(),
            url: Some(format!("{protocol}://{ip}:{port}")),
            lan_url: None,
            wan_url: None,
            title: title.into(),
            custom_name: None,
            icon_url: None,
            is_visible: true,
            is_manual_lock: false,
            last_scanned: T0,
            sort_order: order,
        }
    }

    /// Stand-in for the store: assign ids to inserted rows and return the
    /// full catalog as the next scan would see it.
    fn materialize(rec: Reconciliation, next_id: &mut i64) -> Vec<Service> {
        let mut out = rec.retained;
        for n in rec.inserted {
            *next_id += 1;
            out.push(Service {
                id: *next_id,
                profile_id: n.profile_id,
                ip: n.ip,
                port: n.port,
                protocol: n.protocol,
                url: n.url,
                lan_url: n.lan_url,
                wan_url: n.wan_url,
                title: n.title,
                custom_name: n.custom_name,
                icon_url: n.icon_url,
                is_visible: n.is_visible,
                is_manual_lock: n.is_manual_lock,
                last_scanned: n.last_scanned,
                sort_order: n.sort_order,
            });
        }
        out.sort_by_key(|s| s.sort_order);
        out
    }

    #[test]
    fn locked_row_only_refreshes_last_scanned() {
        let mut nas = row(1, "10.0.0.5", 22, "ssh", "ssh", 0);
        nas.is_manual_lock = true;
        nas.custom_name = Some("NAS-ssh".into());
        let detected = [DetectedService::new("10.0.0.5", 22, "ssh", "OpenSSH 9.2")];

        let rec = reconcile(&[nas.clone()], &detected, 1, T1).unwrap();
        let out = &rec.retained[0];
        assert_eq!(out.title, "ssh");
        assert_eq!(out.custom_name.as_deref(), Some("NAS-ssh"));
        assert_eq!(out.last_scanned, T1);
        assert_eq!(Service { last_scanned: T0, ..out.clone() }, nas);
        assert_eq!(rec.stats, ReconcileStats { locked: 1, ..Default::default() });
    }

    #[test]
    fn unlocked_row_takes_detector_fields_but_keeps_curation() {
        let mut web = row(1, "10.0.0.5", 8080, "http", "old", 0);
        web.custom_name = Some("Grafana".into());
        web.lan_url = Some("http://grafana.lan".into());
        web.is_visible = false;
        let detected = [DetectedService::new("10.0.0.5", 8080, "HTTP", "Grafana 10")];

        let rec = reconcile(&[web], &detected, 1, T1).unwrap();
        let out = &rec.retained[0];
        assert_eq!(out.title, "Grafana 10");
        assert_eq!(out.url.as_deref(), Some("http://10.0.0.5:8080"));
        assert_eq!(out.custom_name.as_deref(), Some("Grafana"));
        assert_eq!(out.lan_url.as_deref(), Some("http://grafana.lan"));
        assert!(!out.is_visible);
        assert_eq!(out.sort_order, 0);
        assert_eq!(rec.stats.updated, 1);
    }

    #[test]
    fn empty_title_does_not_clobber() {
        let web = row(1, "10.0.0.5", 80, "http", "Router", 0);
        let rec = reconcile(&[web], &[DetectedService::new("10.0.0.5", 80, "http", " ")], 1, T1).unwrap();
        assert_eq!(rec.retained[0].title, "Router");
    }

    #[test]
    fn new_service_is_appended_after_existing() {
        let existing = vec![
            row(1, "10.0.0.5", 80, "http", "a", 0),
            row(2, "10.0.0.5", 443, "https", "b", 1),
            row(3, "10.0.0.5", 22, "ssh", "c", 2),
        ];
        let detected = [DetectedService::new("10.0.0.6", 9000, "http", "")];

        let rec = reconcile(&existing, &detected, 1, T1).unwrap();
        assert_eq!(rec.inserted.len(), 1);
        let new = &rec.inserted[0];
        assert_eq!(new.sort_order, 3);
        assert_eq!(new.title, "Port 9000");
        assert!(new.is_visible);
        assert!(!new.is_manual_lock);
        assert_eq!(new.last_scanned, T1);
        let orders: Vec<i64> = rec.retained.iter().map(|s| s.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn absent_rows_are_retained_unchanged() {
        let existing = vec![row(1, "10.0.0.5", 80, "http", "a", 0), row(2, "10.0.0.5", 22, "ssh", "b", 1)];
        let rec = reconcile(&existing, &[], 1, T1).unwrap();
        assert_eq!(rec.retained, existing);
        assert!(rec.inserted.is_empty());
        assert_eq!(rec.stats.untouched, 2);
    }

    #[test]
    fn duplicate_tuples_collapse() {
        let detected = [
            DetectedService::new("10.0.0.5", 80, "http", "first"),
            DetectedService::new("10.0.0.5", 80, "http", "second"),
            DetectedService::new("10.0.0.5", 80, "https", "tls"),
        ];
        let rec = reconcile(&[], &detected, 1, T1).unwrap();
        assert_eq!(rec.inserted.len(), 2);
        assert_eq!(rec.inserted[0].title, "first");
        let keys: HashSet<NaturalKey> = rec.inserted.iter().map(|s| s.key()).collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn rescan_is_idempotent_apart_from_timestamps() {
        let existing = vec![row(1, "10.0.0.5", 80, "http", "a", 0)];
        let detected = [
            DetectedService::new("10.0.0.5", 80, "http", "Home"),
            DetectedService::new("10.0.0.5", 3000, "http", "Grafana"),
        ];
        let mut next_id = 1;
        let first = materialize(reconcile(&existing, &detected, 1, T1).unwrap(), &mut next_id);
        let second = materialize(reconcile(&first, &detected, 1, T2).unwrap(), &mut next_id);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(b.last_scanned, T2);
            assert_eq!(&Service { last_scanned: a.last_scanned, ..b.clone() }, a);
        }
    }

    #[test]
    fn lock_survives_many_passes() {
        let mut locked = row(1, "10.0.0.5", 80, "http", "Pinned", 0);
        locked.is_manual_lock = true;
        let mut catalog = vec![locked.clone()];
        let mut next_id = 1;
        for (i, title) in ["a", "b", "c"].iter().enumerate() {
            let now = T0 + time::Duration::hours(i as i64 + 1);
            let detected = [DetectedService::new("10.0.0.5", 80, "http", *title)];
            catalog = materialize(reconcile(&catalog, &detected, 1, now).unwrap(), &mut next_id);
            assert_eq!(Service { last_scanned: T0, ..catalog[0].clone() }, locked);
        }
    }

    #[test]
    fn rejects_inconsistent_input() {
        let dup = vec![row(1, "10.0.0.5", 80, "http", "a", 0), row(2, "10.0.0.5", 80, "http", "b", 1)];
        assert!(matches!(reconcile(&dup, &[], 1, T1), Err(CatalogError::Conflict(_))));
        let gap = vec![row(1, "10.0.0.5", 80, "http", "a", 0), row(2, "10.0.0.5", 81, "http", "b", 5)];
        assert!(matches!(reconcile(&gap, &[], 1, T1), Err(CatalogError::InvalidOrdering(_))));
        assert!(matches!(reconcile(&gap[..1], &[], 2, T1), Err(CatalogError::Conflict(_))));
    }

    #[test]
    fn malformed_detected_tuples_are_dropped() {
        let existing = vec![row(1, "10.0.0.5", 80, "http", "Home", 0)];
        let detected = vec![
            DetectedService::new("10.0.0.5", 0, "http", "zero"),
            DetectedService::new("not-an-ip", 80, "http", "name"),
            DetectedService::new("10.0.0.5", 8080, "h t t p", "spaces"),
            DetectedService::new("10.0.0.5", 8123, "http", "Home Assistant"),
        ];
        let rec = reconcile(&existing, &detected, 1, T1).unwrap();
        assert_eq!(rec.stats.rejected, 3);
        assert_eq!(rec.inserted.len(), 1);
        assert_eq!(rec.inserted[0].port, 8123);
        assert_eq!(rec.inserted[0].sort_order, 1);
    }
}
