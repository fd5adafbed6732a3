use rusqlite::{Connection, Row};
use time::OffsetDateTime;

use homescan_core::{Profile, Service};

pub(crate) fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let cnt: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
        [name],
        |r| r.get(0),
    )?;
    Ok(cnt > 0)
}

pub(crate) const SERVICE_COLUMNS: &str = "id,profile_id,ip,port,protocol,url,lan_url,wan_url,title,custom_name,icon_url,is_visible,is_manual_lock,last_scanned_ms,sort_order";

pub(crate) const PROFILE_COLUMNS: &str = "id,name,scan_target,is_guest_default";

pub(crate) fn service_from_row(r: &Row<'_>) -> rusqlite::Result<Service> {
    Ok(Service {
        id: r.get(0)?,
        profile_id: r.get(1)?,
        ip: r.get(2)?,
        port: r.get(3)?,
        protocol: r.get(4)?,
        url: r.get(5)?,
        lan_url: r.get(6)?,
        wan_url: r.get(7)?,
        title: r.get(8)?,
        custom_name: r.get(9)?,
        icon_url: r.get(10)?,
        is_visible: r.get(11)?,
        is_manual_lock: r.get(12)?,
        last_scanned: from_millis(13, r.get(13)?)?,
        sort_order: r.get(14)?,
    })
}

pub(crate) fn profile_from_row(r: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: r.get(0)?,
        name: r.get(1)?,
        scan_target: r.get(2)?,
        is_guest_default: r.get(3)?,
    })
}

pub(crate) fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_millis(col: usize, ms: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Integer, Box::new(e)))
}
