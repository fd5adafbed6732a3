use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Credentials;
use crate::detector::DetectorOptions;

pub const DEFAULT_CONFIG_FILE: &str = "homescan.yaml";
pub const PASSWORD_ENV: &str = "HOMESCAN_ADMIN_PASSWORD";

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    pub ports: Option<String>,
    pub top: Option<usize>,
    pub discover_ports: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub host_concurrency: Option<usize>,
    pub qps: Option<u32>,
    pub retries: Option<u32>,
    pub probe_timeout_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub web_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub token_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Loads `path`, or `./homescan.yaml` when present. No file means defaults;
/// a file that exists but does not parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() { p.to_path_buf() } else { return Ok(Config::default()); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    parse_config(&s).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_config(s: &str) -> Result<Config> {
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(s)?)
}

impl Config {
    pub fn bind(&self) -> &str {
        self.server.bind.as_deref().unwrap_or("0.0.0.0:8000")
    }

    pub fn db_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| PathBuf::from("./services.db"))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan.timeout_secs.unwrap_or(120).max(1))
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs.unwrap_or(86_400).max(1))
    }

    pub fn detector_options(&self) -> Result<DetectorOptions> {
        let s = &self.scan;
        let ports = match (&s.ports, s.top) {
            (Some(_), Some(_)) => return Err(anyhow!("scan.ports and scan.top are mutually exclusive")),
            (Some(spec), None) => port_scan::parse_ports(spec)?,
            (None, Some(n)) if n == 0 => return Err(anyhow!("scan.top must be at least 1")),
            (None, Some(n)) => port_scan::top_ports(n),
            (None, None) => port_scan::default_top_ports(),
        };
        let discover_ports = port_scan::parse_ports(s.discover_ports.as_deref().unwrap_or("80,443,22,8080,8443"))?;
        Ok(DetectorOptions {
            ports,
            discover_ports,
            connect_timeout: Duration::from_millis(s.connect_timeout_ms.unwrap_or(500)),
            concurrency: s.concurrency.unwrap_or(256).max(1),
            host_concurrency: s.host_concurrency.unwrap_or(16).max(1),
            qps: s.qps.unwrap_or(0),
            retries: s.retries.unwrap_or(0),
            probe_timeout_ms: s.probe_timeout_ms.unwrap_or(3000),
            web_only: s.web_only.unwrap_or(false),
        })
    }

    /// Admin credentials; `env_password` (normally `$HOMESCAN_ADMIN_PASSWORD`)
    /// wins over the file.
    pub fn credentials(&self, env_password: Option<String>) -> Credentials {
        Credentials {
            username: self.auth.username.clone().unwrap_or_else(|| "admin".to_string()),
            password: env_password
                .filter(|p| !p.is_empty())
                .or_else(|| self.auth.password.clone())
                .unwrap_or_else(|| "admin".to_string()),
        }
    }
}
