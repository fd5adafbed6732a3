use std::collections::HashSet;

use homescan_core::ordering::{append_positions, ensure_dense};
use homescan_core::{CatalogError, NewService, ProfileId, Reconciliation, Service, ServiceId};
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::debug;

use crate::query::{service_from_row, to_millis, SERVICE_COLUMNS};
use crate::{Db, StoreError, StoreResult};

impl Db {
    /// Services of a profile in display order.
    pub fn list_services(&self, profile_id: ProfileId, include_hidden: bool) -> StoreResult<Vec<Service>> {
        self.get_profile(profile_id)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE profile_id=? AND (is_visible=1 OR ?) ORDER BY sort_order, id"
        ))?;
        let rows = stmt.query_map(params![profile_id, include_hidden], service_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_service(&self, id: ServiceId) -> StoreResult<Service> {
        self.conn
            .query_row(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id=?"), [id], service_from_row)
            .optional()?
            .ok_or_else(|| CatalogError::not_found("service", id).into())
    }

    /// Adds a user-defined row at the end of the profile's ordering.
    pub fn insert_manual(
        &mut self,
        profile_id: ProfileId,
        build: impl FnOnce(i64) -> Result<NewService, CatalogError>,
    ) -> StoreResult<Service> {
        self.get_profile(profile_id)?;
        let tx = self.conn.transaction()?;
        let orders = sort_orders(&tx, profile_id)?;
        let position = append_positions(orders, 1)[0];
        let row = build(position)?;
        if row.profile_id != profile_id {
            return Err(CatalogError::Validation("service profile does not match".into()).into());
        }
        let id = insert_row(&tx, &row).map_err(|e| duplicate_key(e, &row))?;
        ensure_dense(sort_orders(&tx, profile_id)?)?;
        tx.commit()?;
        self.get_service(id)
    }

    /// Persists the curation fields of `svc`. Detector-owned fields,
    /// `last_scanned` and `sort_order` are left as stored.
    pub fn save_curation(&self, svc: &Service) -> StoreResult<Service> {
        let n = self.conn.execute(
            "UPDATE services SET custom_name=?, icon_url=?, lan_url=?, wan_url=?, is_visible=?, is_manual_lock=? WHERE id=?",
            params![svc.custom_name, svc.icon_url, svc.lan_url, svc.wan_url, svc.is_visible, svc.is_manual_lock, svc.id],
        )?;
        if n == 0 {
            return Err(CatalogError::not_found("service", svc.id).into());
        }
        self.get_service(svc.id)
    }

    /// Explicit deletion; later rows move up one position so the ordering
    /// stays dense.
    pub fn delete_service(&mut self, id: ServiceId) -> StoreResult<Service> {
        let svc = self.get_service(id)?;
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM services WHERE id=?", [id])?;
        tx.execute(
            "UPDATE services SET sort_order = sort_order - 1 WHERE profile_id=? AND sort_order > ?",
            params![svc.profile_id, svc.sort_order],
        )?;
        ensure_dense(sort_orders(&tx, svc.profile_id)?)?;
        tx.commit()?;
        Ok(svc)
    }

    /// Makes a reconciliation result the profile's catalog in one
    /// transaction. The retained rows must be exactly the rows currently
    /// stored; otherwise the catalog changed under the caller and nothing is
    /// written.
    pub fn replace_catalog(&mut self, profile_id: ProfileId, rec: &Reconciliation) -> StoreResult<Vec<Service>> {
        self.get_profile(profile_id)?;
        let tx = self.conn.transaction()?;

        let current: HashSet<ServiceId> = service_ids(&tx, profile_id)?.into_iter().collect();
        let retained: HashSet<ServiceId> = rec.retained.iter().map(|s| s.id).collect();
        if current != retained || retained.len() != rec.retained.len() {
            return Err(CatalogError::Conflict(format!(
                "catalog of profile {profile_id} changed during reconciliation"
            ))
            .into());
        }

        {
            let mut update = tx.prepare(
                "UPDATE services SET protocol=?, url=?, title=?, last_scanned_ms=? WHERE id=? AND profile_id=?",
            )?;
            for svc in &rec.retained {
                update.execute(params![svc.protocol, svc.url, svc.title, to_millis(svc.last_scanned), svc.id, profile_id])?;
            }
        }
        for row in &rec.inserted {
            if row.profile_id != profile_id {
                return Err(CatalogError::Validation("inserted row targets another profile".into()).into());
            }
            insert_row(&tx, row).map_err(|e| duplicate_key(e, row))?;
        }
        ensure_dense(sort_orders(&tx, profile_id)?)?;
        tx.commit()?;
        debug!(profile_id, retained = rec.retained.len(), inserted = rec.inserted.len(), "catalog replaced");

        self.list_services(profile_id, true)
    }

    /// Assigns the given `(id, position)` pairs. All ids must belong to the
    /// profile and the result must be dense, or nothing changes.
    pub fn apply_order(&mut self, profile_id: ProfileId, plan: &[(ServiceId, i64)]) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE services SET sort_order=? WHERE id=? AND profile_id=?")?;
            for (id, pos) in plan {
                if stmt.execute(params![pos, id, profile_id])? == 0 {
                    return Err(CatalogError::InvalidOrdering(format!(
                        "service {id} does not belong to profile {profile_id}"
                    ))
                    .into());
                }
            }
        }
        ensure_dense(sort_orders(&tx, profile_id)?)?;
        tx.commit()?;
        Ok(())
    }

    /// Ids of the profile's services in display order.
    pub fn service_ids(&self, profile_id: ProfileId) -> StoreResult<Vec<ServiceId>> {
        let mut stmt = self.conn.prepare("SELECT id FROM services WHERE profile_id=? ORDER BY sort_order, id")?;
        let rows = stmt.query_map([profile_id], |r| r.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn service_ids(tx: &Transaction<'_>, profile_id: ProfileId) -> rusqlite::Result<Vec<ServiceId>> {
    let mut stmt = tx.prepare("SELECT id FROM services WHERE profile_id=?")?;
    let rows = stmt.query_map([profile_id], |r| r.get(0))?;
    rows.collect()
}

fn sort_orders(tx: &Transaction<'_>, profile_id: ProfileId) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = tx.prepare("SELECT sort_order FROM services WHERE profile_id=?")?;
    let rows = stmt.query_map([profile_id], |r| r.get(0))?;
    rows.collect()
}

fn insert_row(tx: &Transaction<'_>, row: &NewService) -> rusqlite::Result<ServiceId> {
    tx.execute(
        "INSERT INTO services(profile_id,ip,port,protocol,url,lan_url,wan_url,title,custom_name,icon_url,is_visible,is_manual_lock,last_scanned_ms,sort_order)
         VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
        params![
            row.profile_id,
            row.ip,
            row.port,
            row.protocol,
            row.url,
            row.lan_url,
            row.wan_url,
            row.title,
            row.custom_name,
            row.icon_url,
            row.is_visible,
            row.is_manual_lock,
            to_millis(row.last_scanned),
            row.sort_order
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn duplicate_key(err: rusqlite::Error, row: &NewService) -> StoreError {
    let err = StoreError::from(err);
    if err.is_unique_violation() {
        CatalogError::Conflict(format!("service {} already exists in this profile", row.key())).into()
    } else {
        err
    }
}
