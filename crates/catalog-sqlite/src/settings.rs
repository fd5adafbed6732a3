use homescan_core::AppSettings;
use rusqlite::params;

use crate::{Db, StoreResult};

impl Db {
    pub fn load_settings(&self) -> StoreResult<AppSettings> {
        let row = self.conn.query_row(
            "SELECT site_title,site_icon_url,view_mode,grid_size,theme_mode,accent_color,default_sort_by FROM app_settings WHERE id=1",
            [],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                ))
            },
        )?;
        let (site_title, site_icon_url, view_mode, grid_size, theme_mode, accent_color, default_sort_by) = row;
        Ok(AppSettings {
            site_title,
            site_icon_url,
            view_mode: view_mode.parse()?,
            grid_size: grid_size.parse()?,
            theme_mode: theme_mode.parse()?,
            accent_color,
            default_sort_by: default_sort_by.parse()?,
        })
    }

    /// Settings are a single row, updated in place.
    pub fn save_settings(&self, s: &AppSettings) -> StoreResult<AppSettings> {
        self.conn.execute(
            "UPDATE app_settings SET site_title=?, site_icon_url=?, view_mode=?, grid_size=?, theme_mode=?, accent_color=?, default_sort_by=? WHERE id=1",
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
        self.load_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homescan_core::{SettingsPatch, SortField, ThemeMode};

    #[test]
    fn settings_update_in_place() {
        let db = Db::open_in_memory().unwrap();
        let current = db.load_settings().unwrap();
        let patch = SettingsPatch { theme_mode: Some(ThemeMode::Dark), default_sort_by: Some(SortField::Port), ..Default::default() };
        let saved = db.save_settings(&patch.apply(&current).unwrap()).unwrap();
        assert_eq!(saved.theme_mode, ThemeMode::Dark);
        assert_eq!(saved.default_sort_by, SortField::Port);
        assert_eq!(saved.site_title, current.site_title);
        assert_eq!(db.load_settings().unwrap(), saved);
    }
}
