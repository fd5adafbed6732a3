pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE profiles (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  name              TEXT NOT NULL UNIQUE,
  scan_target       TEXT,
  is_guest_default  INTEGER NOT NULL DEFAULT 0 CHECK (is_guest_default IN (0,1))
);

-- at most one guest-default profile
CREATE UNIQUE INDEX idx_profiles_guest ON profiles(is_guest_default) WHERE is_guest_default = 1;

CREATE TABLE services (
  id                INTEGER PRIMARY KEY AUTOINCREMENT,
  profile_id        INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
  ip                TEXT NOT NULL,
  port              INTEGER NOT NULL CHECK (port BETWEEN 1 AND 65535),
  protocol          TEXT NOT NULL,
  url               TEXT,
  lan_url           TEXT,
  wan_url           TEXT,
  title             TEXT NOT NULL DEFAULT '',
  custom_name       TEXT,
  icon_url          TEXT,
  is_visible        INTEGER NOT NULL DEFAULT 1 CHECK (is_visible IN (0,1)),
  is_manual_lock    INTEGER NOT NULL DEFAULT 0 CHECK (is_manual_lock IN (0,1)),
  last_scanned_ms   INTEGER NOT NULL,
  sort_order        INTEGER NOT NULL CHECK (sort_order >= 0),
  UNIQUE (profile_id, ip, port, protocol)
);

CREATE TABLE app_settings (
  id                INTEGER PRIMARY KEY CHECK (id = 1),
  site_title        TEXT NOT NULL,
  site_icon_url     TEXT,
  view_mode         TEXT NOT NULL,
  grid_size         TEXT NOT NULL,
  theme_mode        TEXT NOT NULL,
  accent_color      TEXT NOT NULL,
  default_sort_by   TEXT NOT NULL
);

CREATE INDEX idx_services_profile_order ON services(profile_id, sort_order);

COMMIT;
"#
;
