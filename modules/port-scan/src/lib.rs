//! TCP connect scan with timeouts, bounded concurrency and optional pacing.

use anyhow::{anyhow, Result};
use homescan_core::ratelimiter::RateLimiter;
use rand::{thread_rng, Rng};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::trace;

/// Parse a comma-separated list of ports/ranges (e.g., "22,80,443", "1-1024,8080").
pub fn parse_ports(spec: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let s: u16 = start.trim().parse().map_err(|_| anyhow!("invalid port range: {part}"))?;
                let e: u16 = end.trim().parse().map_err(|_| anyhow!("invalid port range: {part}"))?;
                if s == 0 || s > e {
                    return Err(anyhow!("invalid port range: {part}"));
                }
                ports.extend(s..=e);
            }
            None => {
                let p: u16 = part.parse().map_err(|_| anyhow!("invalid port: {part}"))?;
                if p == 0 {
                    return Err(anyhow!("invalid port: {part}"));
                }
                ports.push(p);
            }
        }
    }
    if ports.is_empty() {
        return Err(anyhow!("no ports in {spec:?}"));
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

// Ports a self-hosted dashboard usually cares about, most common first.
const CURATED: &[u16] = &[
    80, 443, 22, 8080, 8443, 3000, 5000, 8000, 8081, 9000, 9090, 8123, 8096, 32400, 8920, 9443,
    5001, 8888, 3001, 8200, 8384, 9091, 7878, 8989, 8686, 9696, 6767, 5055, 8112, 19999, 2283,
    8006, 10000, 1880, 3306, 5432, 6379, 27017, 21, 445, 139, 2049, 53, 25, 587, 993, 631, 9100,
    1883, 5900, 3389, 8008, 8009, 4040, 5601, 9200,
];

/// Default ports if none are configured.
pub fn default_top_ports() -> Vec<u16> {
    top_ports(CURATED.len())
}

/// Return the first N ports of the curated list.
pub fn top_ports(n: usize) -> Vec<u16> {
    let take = n.min(CURATED.len());
    let mut ports = CURATED[..take].to_vec();
    ports.sort_unstable();
    ports
}

/// Conventional protocol name for a well-known port.
pub fn service_hint(port: u16) -> Option<&'static str> {
    Some(match port {
        21 => "ftp",
        22 => "ssh",
        25 | 587 => "smtp",
        53 => "dns",
        139 | 445 => "smb",
        631 => "ipp",
        993 => "imaps",
        1883 => "mqtt",
        2049 => "nfs",
        3306 => "mysql",
        3389 => "rdp",
        5432 => "postgresql",
        5900 => "vnc",
        6379 => "redis",
        9100 => "jetdirect",
        27017 => "mongodb",
        _ => return None,
    })
}

#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub timeout_per_port: Duration,
    pub concurrency: usize,
    pub retries: u32,
    pub retry_delay: Duration,
    /// Shared pacing across hosts.
    pub qps: Option<RateLimiter>,
    /// Shared cap on simultaneous connects across hosts.
    pub global_limit: Option<Arc<Semaphore>>,
}

/// Scan `ports` on one address. Returns the open ports, ascending.
///
/// Connects run on a `JoinSet`; dropping the returned future aborts them.
pub async fn scan_connect(addr: IpAddr, ports: &[u16], opts: &ConnectOptions) -> Vec<u16> {
    let host_sem = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let mut connects = JoinSet::new();

    for &port in ports {
        let host_sem = host_sem.clone();
        let opts = opts.clone();
        connects.spawn(async move {
            let _host_permit = host_sem.acquire_owned().await.ok()?;
            let _global_permit = match &opts.global_limit {
                Some(g) => Some(g.clone().acquire_owned().await.ok()?),
                None => None,
            };
            if let Some(q) = &opts.qps {
                q.acquire().await;
            }
            probe_port(SocketAddr::new(addr, port), &opts).await.then_some(port)
        });
    }

    let mut open = Vec::new();
    while let Some(res) = connects.join_next().await {
        if let Ok(Some(p)) = res {
            open.push(p);
        }
    }
    open.sort_unstable();
    trace!(%addr, scanned = ports.len(), open = open.len(), "connect scan done");
    open
}

async fn probe_port(addr: SocketAddr, opts: &ConnectOptions) -> bool {
    let mut attempts = 0;
    loop {
        if let Ok(Ok(_stream)) = timeout(opts.timeout_per_port, TcpStream::connect(addr)).await {
            return true;
        }
        attempts += 1;
        if attempts > opts.retries {
            return false;
        }
        let base = opts.retry_delay.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempts.min(6)); // cap growth
        let jitter = thread_rng().gen_range(0..(exp / 4 + 1));
        tokio::time::sleep(Duration::from_millis(exp + jitter)).await;
    }
}
