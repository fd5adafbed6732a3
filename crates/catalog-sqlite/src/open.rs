use std::path::Path;
use std::time::Duration;

use homescan_core::{AppSettings, DEFAULT_PROFILE_NAME};
use rusqlite::{params, Connection};
use tracing::info;

use crate::schema::MIG_0001_INIT;
use crate::StoreResult;

/// Owns the connection. Methods that need a transaction take `&mut self`;
/// callers share a `Db` behind a mutex.
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        info!(path = %path.as_ref().display(), "catalog opened");
        Ok(Db { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Db { conn })
    }
}

fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    // naive: if the profiles table doesn't exist, apply 0001 and seed
    if !crate::query::table_exists(conn, "profiles")? {
        conn.execute_batch(MIG_0001_INIT)?;
        seed(conn)?;
    }
    Ok(())
}

fn seed(conn: &Connection) -> StoreResult<()> {
    let s = AppSettings::default();
    conn.execute(
        "INSERT INTO app_settings(id,site_title,site_icon_url,view_mode,grid_size,theme_mode,accent_color,default_sort_by)
         VALUES (1,?,?,?,?,?,?,?)",
        params![
            s.site_title,
            s.site_icon_url,
            s.view_mode.as_str(),
            s.grid_size.as_str(),
            s.theme_mode.as_str(),
            s.accent_color,
            s.default_sort_by.as_str()
        ],
    )?;
    conn.execute(
        "INSERT INTO profiles(name,scan_target,is_guest_default) VALUES (?,?,1)",
        params![DEFAULT_PROFILE_NAME, "127.0.0.1"],
    )?;
    Ok(())
}
