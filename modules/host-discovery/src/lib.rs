//! Turning a scan target into the addresses worth port-scanning.

use anyhow::{anyhow, Result};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::debug;

/// Largest subnet a single scan may sweep (a /22 worth of hosts).
pub const MAX_SUBNET_HOSTS: usize = 1024;

/// Expand a subnet into its host addresses.
pub fn expand_subnet(net: &IpNet) -> Result<Vec<IpAddr>> {
    let mut ips = Vec::new();
    for ip in net.hosts() {
        if ips.len() == MAX_SUBNET_HOSTS {
            return Err(anyhow!("subnet {net} has more than {MAX_SUBNET_HOSTS} hosts"));
        }
        ips.push(ip);
    }
    Ok(ips)
}

/// Resolve a hostname to its first address.
pub async fn resolve_host(host: &str) -> Result<IpAddr> {
    let mut addrs = tokio::net::lookup_host((host, 0u16)).await?;
    addrs
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| anyhow!("{host} did not resolve to any address"))
}

/// A host is live if any of `ports` accepts a connection within the timeout.
pub async fn is_host_live(ip: IpAddr, ports: &[u16], per_attempt: Duration) -> bool {
    for &p in ports {
        if let Ok(Ok(_)) = timeout(per_attempt, TcpStream::connect(SocketAddr::new(ip, p))).await {
            return true;
        }
    }
    false
}

/// Sweep `ips` for liveness with bounded concurrency and optional pacing.
/// Returns live hosts in ascending order.
pub async fn discover_hosts(
    ips: Vec<IpAddr>,
    ports: &[u16],
    timeout_per_attempt: Duration,
    concurrency: usize,
    qps: Option<u32>,
) -> Vec<IpAddr> {
    let total = ips.len();
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut ticker = qps.map(|q| {
        let mut it = interval(Duration::from_millis((1000 / q.max(1)).max(1) as u64));
        it.set_missed_tick_behavior(MissedTickBehavior::Delay);
        it
    });

    // Held on a JoinSet so a dropped sweep aborts its checks.
    let mut checks = JoinSet::new();
    for ip in ips {
        if let Some(t) = ticker.as_mut() {
            t.tick().await;
        }
        let Ok(permit) = sem.clone().acquire_owned().await else { break };
        let p = ports.to_vec();
        checks.spawn(async move {
            let live = is_host_live(ip, &p, timeout_per_attempt).await;
            drop(permit);
            live.then_some(ip)
        });
    }

    let mut live = Vec::new();
    while let Some(res) = checks.join_next().await {
        if let Ok(Some(ip)) = res {
            live.push(ip);
        }
    }
    live.sort_unstable();
    debug!(swept = total, live = live.len(), "host sweep done");
    live
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_small_subnet() {
        let net: IpNet = "192.168.10.0/30".parse().unwrap();
        let ips = expand_subnet(&net).unwrap();
        assert_eq!(ips, vec!["192.168.10.1".parse::<IpAddr>().unwrap(), "192.168.10.2".parse().unwrap()]);
    }

    #[test]
    fn refuses_huge_subnet() {
        let net: IpNet = "10.0.0.0/16".parse().unwrap();
        assert!(expand_subnet(&net).is_err());
    }

    #[tokio::test]
    async fn listening_host_is_live() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let live = discover_hosts(vec!["127.0.0.1".parse().unwrap()], &[port], Duration::from_millis(300), 8, None).await;
        assert_eq!(live.len(), 1);
    }
}
