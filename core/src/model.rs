use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::CatalogError;
use crate::Target;

pub type ProfileId = i64;
pub type ServiceId = i64;

/// `(ip, port, protocol)`: the deduplication key of a service within a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey {
    pub ip: String,
    pub port: u16,
    pub protocol: String,
}

impl NaturalKey {
    /// Canonicalizes the address text and lower-cases the protocol so that
    /// `010.0.0.5`-style spellings never produce a second row.
    pub fn new(ip: &str, port: u16, protocol: &str) -> Self {
        let ip = match ip.trim().parse::<IpAddr>() {
            Ok(addr) => addr.to_string(),
            Err(_) => ip.trim().to_ascii_lowercase(),
        };
        NaturalKey { ip, port, protocol: protocol.trim().to_ascii_lowercase() }
    }

    pub fn url(&self) -> String {
        match self.ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("{}://[{}]:{}", self.protocol, v6, self.port),
            _ => format!("{}://{}:{}", self.protocol, self.ip, self.port),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.ip, self.port, self.protocol)
    }
}

/// One raw tuple yielded by a detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedService {
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    #[serde(default)]
    pub title: String,
}

impl DetectedService {
    pub fn new(ip: impl Into<String>, port: u16, protocol: impl Into<String>, title: impl Into<String>) -> Self {
        DetectedService { ip: ip.into(), port, protocol: protocol.into(), title: title.into() }
    }

    pub fn key(&self) -> NaturalKey {
        NaturalKey::new(&self.ip, self.port, &self.protocol)
    }

    /// Detector output is checked like user input before it reaches the store.
    pub fn validate(&self) -> Result<NaturalKey, CatalogError> {
        self.ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| CatalogError::Validation(format!("detected malformed ip address: {:?}", self.ip)))?;
        if self.port == 0 {
            return Err(CatalogError::Validation(format!("detected port 0 on {}", self.ip)));
        }
        validate_protocol(&self.protocol)?;
        Ok(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub profile_id: ProfileId,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub url: Option<String>,
    pub lan_url: Option<String>,
    pub wan_url: Option<String>,
    pub title: String,
    pub custom_name: Option<String>,
    pub icon_url: Option<String>,
    pub is_visible: bool,
    pub is_manual_lock: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_scanned: OffsetDateTime,
    pub sort_order: i64,
}

impl Service {
    pub fn key(&self) -> NaturalKey {
        NaturalKey::new(&self.ip, self.port, &self.protocol)
    }

    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.title)
    }
}

/// A service row that has not been assigned an identity yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub profile_id: ProfileId,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub url: Option<String>,
    pub lan_url: Option<String>,
    pub wan_url: Option<String>,
    pub title: String,
    pub custom_name: Option<String>,
    pub icon_url: Option<String>,
    pub is_visible: bool,
    pub is_manual_lock: bool,
    pub last_scanned: OffsetDateTime,
    pub sort_order: i64,
}

impl NewService {
    /// Fresh row for a tuple the profile has never seen.
    pub fn discovered(profile_id: ProfileId, detected: &DetectedService, now: OffsetDateTime, sort_order: i64) -> Self {
        let key = detected.key();
        let title = match detected.title.trim() {
            "" => format!("Port {}", key.port),
            t => t.to_string(),
        };
        NewService {
            profile_id,
            url: Some(key.url()),
            ip: key.ip,
            port: key.port,
            protocol: key.protocol,
            lan_url: None,
            wan_url: None,
            title,
            custom_name: None,
            icon_url: None,
            is_visible: true,
            is_manual_lock: false,
            last_scanned: now,
            sort_order,
        }
    }

    pub fn key(&self) -> NaturalKey {
        NaturalKey::new(&self.ip, self.port, &self.protocol)
    }
}

/// User-defined service added outside of a scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManualService {
    pub profile_id: ProfileId,
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub custom_name: Option<String>,
    pub lan_url: Option<String>,
    pub wan_url: Option<String>,
}

fn default_protocol() -> String {
    "http".to_string()
}

impl ManualService {
    pub fn validate(&self) -> Result<NaturalKey, CatalogError> {
        self.ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| CatalogError::Validation(format!("malformed ip address: {}", self.ip)))?;
        if self.port == 0 {
            return Err(CatalogError::Validation("port must be between 1 and 65535".into()));
        }
        validate_protocol(&self.protocol)?;
        Ok(NaturalKey::new(&self.ip, self.port, &self.protocol))
    }

    pub fn into_new(self, now: OffsetDateTime, sort_order: i64) -> Result<NewService, CatalogError> {
        let key = self.validate()?;
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Manual Service".to_string());
        Ok(NewService {
            profile_id: self.profile_id,
            url: non_empty(self.url).or_else(|| Some(key.url())),
            ip: key.ip,
            port: key.port,
            protocol: key.protocol,
            lan_url: non_empty(self.lan_url),
            wan_url: non_empty(self.wan_url),
            title,
            custom_name: non_empty(self.custom_name),
            icon_url: None,
            is_visible: true,
            is_manual_lock: true,
            last_scanned: now,
            sort_order,
        })
    }
}

pub fn validate_protocol(protocol: &str) -> Result<(), CatalogError> {
    let p = protocol.trim();
    if p.is_empty() || p.len() > 32 || !p.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '+' || c == '.') {
        return Err(CatalogError::Validation(format!("malformed protocol: {protocol:?}")));
    }
    Ok(())
}

/// Curation fields a caller may change on an existing service. Detector
/// owned fields, `last_scanned` and `sort_order` are deliberately absent so
/// that a request naming them is rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicePatch {
    pub custom_name: Option<String>,
    pub icon_url: Option<String>,
    pub lan_url: Option<String>,
    pub wan_url: Option<String>,
    pub is_visible: Option<bool>,
    pub is_manual_lock: Option<bool>,
}

impl ServicePatch {
    /// An empty string clears an optional text field.
    pub fn apply(&self, svc: &mut Service) {
        if let Some(v) = &self.custom_name {
            svc.custom_name = non_empty(Some(v.clone()));
        }
        if let Some(v) = &self.icon_url {
            svc.icon_url = non_empty(Some(v.clone()));
        }
        if let Some(v) = &self.lan_url {
            svc.lan_url = non_empty(Some(v.clone()));
        }
        if let Some(v) = &self.wan_url {
            svc.wan_url = non_empty(Some(v.clone()));
        }
        if let Some(v) = self.is_visible {
            svc.is_visible = v;
        }
        if let Some(v) = self.is_manual_lock {
            svc.is_manual_lock = v;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ServicePatch::default()
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub scan_target: Option<String>,
    pub is_guest_default: bool,
}

pub const DEFAULT_PROFILE_NAME: &str = "Default";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewProfile {
    pub name: String,
    pub scan_target: Option<String>,
}

impl NewProfile {
    pub fn validate(&self) -> Result<(), CatalogError> {
        validate_profile_name(&self.name)?;
        if let Some(t) = &self.scan_target {
            t.parse::<Target>()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub scan_target: Option<String>,
}

impl ProfilePatch {
    pub fn validate(&self) -> Result<(), CatalogError> {
        if let Some(n) = &self.name {
            validate_profile_name(n)?;
        }
        if let Some(t) = self.scan_target.as_deref().filter(|t| !t.trim().is_empty()) {
            t.parse::<Target>()?;
        }
        Ok(())
    }
}

fn validate_profile_name(name: &str) -> Result<(), CatalogError> {
    let n = name.trim();
    if n.is_empty() {
        return Err(CatalogError::Validation("profile name is required".into()));
    }
    if n.chars().count() > 64 {
        return Err(CatalogError::Validation("profile name is longer than 64 characters".into()));
    }
    Ok(())
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? } default $default:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name { $($variant),+ }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self { $($name::$variant => $text),+ }
            }
        }

        impl Default for $name {
            fn default() -> Self { $name::$default }
        }

        impl FromStr for $name {
            type Err = CatalogError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CatalogError::Validation(format!(
                        concat!("unknown ", stringify!($name), " {:?}"), other
                    ))),
                }
            }
        }
    };
}

text_enum!(ViewMode { Grid => "grid", List => "list" } default Grid);
text_enum!(GridSize { Small => "small", Medium => "medium", Large => "large" } default Medium);
text_enum!(ThemeMode { Light => "light", Dark => "dark", Auto => "auto" } default Auto);
text_enum!(
    /// Field the dashboard sorts by when no explicit order is requested.
    SortField { Custom => "custom", Name => "name", Port => "port" } default Custom
);

/// Site-wide presentation settings. Exactly one row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    pub site_title: String,
    pub site_icon_url: Option<String>,
    pub view_mode: ViewMode,
    pub grid_size: GridSize,
    pub theme_mode: ThemeMode,
    pub accent_color: String,
    pub default_sort_by: SortField,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            site_title: "HomePageScan".to_string(),
            site_icon_url: None,
            view_mode: ViewMode::default(),
            grid_size: GridSize::default(),
            theme_mode: ThemeMode::default(),
            accent_color: "#3b82f6".to_string(),
            default_sort_by: SortField::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsPatch {
    pub site_title: Option<String>,
    pub site_icon_url: Option<String>,
    pub view_mode: Option<ViewMode>,
    pub grid_size: Option<GridSize>,
    pub theme_mode: Option<ThemeMode>,
    pub accent_color: Option<String>,
    pub default_sort_by: Option<SortField>,
}

impl SettingsPatch {
    /// Produces the next settings row, or fails without touching `current`.
    pub fn apply(&self, current: &AppSettings) -> Result<AppSettings, CatalogError> {
        let mut next = current.clone();
        if let Some(t) = &self.site_title {
            if t.trim().is_empty() {
                return Err(CatalogError::Validation("site title is required".into()));
            }
            next.site_title = t.trim().to_string();
        }
        if let Some(icon) = &self.site_icon_url {
            next.site_icon_url = non_empty(Some(icon.clone()));
        }
        if let Some(c) = &self.accent_color {
            if !is_hex_color(c) {
                return Err(CatalogError::Validation(format!("accent color must look like #rrggbb, got {c:?}")));
            }
            next.accent_color = c.to_ascii_lowercase();
        }
        next.view_mode = self.view_mode.unwrap_or(next.view_mode);
        next.grid_size = self.grid_size.unwrap_or(next.grid_size);
        next.theme_mode = self.theme_mode.unwrap_or(next.theme_mode);
        next.default_sort_by = self.default_sort_by.unwrap_or(next.default_sort_by);
        Ok(next)
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
