//! Domain types, reconciliation and ordering rules shared by the homescan crates.

pub mod detector;
pub mod error;
pub mod model;
pub mod ordering;
pub mod ratelimiter;
pub mod reconcile;

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

pub use detector::{Detector, DetectorError};
pub use error::{CatalogError, CatalogResult};
pub use model::*;
pub use reconcile::{reconcile, ReconcileStats, Reconciliation};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Scan target: one host or one subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Addr(IpAddr),
    Subnet(IpNet),
    Hostname(String),
}

impl FromStr for Target {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CatalogError::Validation("scan target is empty".into()));
        }
        if let Ok(ip) = s.parse::<IpAddr>() {
            return Ok(Target::Addr(ip));
        }
        if s.contains('/') {
            return s
                .parse::<IpNet>()
                .map(Target::Subnet)
                .map_err(|_| CatalogError::Validation(format!("malformed subnet: {s}")));
        }
        if is_hostname(s) {
            return Ok(Target::Hostname(s.to_ascii_lowercase()));
        }
        Err(CatalogError::Validation(format!("malformed scan target: {s}")))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Addr(ip) => write!(f, "{ip}"),
            Target::Subnet(net) => write!(f, "{net}"),
            Target::Hostname(h) => f.write_str(h),
        }
    }
}

fn is_hostname(s: &str) -> bool {
    if s.len() > 253 {
        return false;
    }
    // All-numeric dotted strings are malformed addresses, not names.
    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
