//! The production `Detector`: host sweep, connect scan, then per-port
//! classification.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use homescan_core::ratelimiter::RateLimiter;
use homescan_core::{DetectedService, Detector, DetectorError, Target};
use port_scan::ConnectOptions;
use reqwest::Client;
use service_probe::ProbeOptions;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct DetectorOptions {
    pub ports: Vec<u16>,
    /// Ports tried when sweeping a subnet for live hosts.
    pub discover_ports: Vec<u16>,
    pub connect_timeout: Duration,
    pub concurrency: usize,
    pub host_concurrency: usize,
    pub qps: u32,
    pub retries: u32,
    pub probe_timeout_ms: u64,
    /// Report only ports that answered HTTP(S).
    pub web_only: bool,
}

pub struct NetworkDetector {
    opts: DetectorOptions,
    client: Client,
}

impl NetworkDetector {
    pub fn new(opts: DetectorOptions) -> Result<Self> {
        let client = service_probe::build_client(&ProbeOptions {
            timeout_ms: opts.probe_timeout_ms,
            redirects: 3,
            user_agent: format!("homescan/{}", env!("CARGO_PKG_VERSION")),
        })?;
        Ok(NetworkDetector { opts, client })
    }

    async fn hosts(&self, target: &Target) -> Result<Vec<IpAddr>> {
        match target {
            Target::Addr(ip) => Ok(vec![*ip]),
            Target::Hostname(name) => Ok(vec![host_discovery::resolve_host(name).await?]),
            Target::Subnet(net) => {
                let candidates = host_discovery::expand_subnet(net)?;
                let qps = (self.opts.qps > 0).then_some(self.opts.qps);
                Ok(host_discovery::discover_hosts(
                    candidates,
                    &self.opts.discover_ports,
                    self.opts.connect_timeout,
                    self.opts.concurrency,
                    qps,
                )
                .await)
            }
        }
    }

    async fn run(&self, target: &Target) -> Result<Vec<DetectedService>> {
        let hosts = self.hosts(target).await?;
        debug!(%target, hosts = hosts.len(), "hosts to scan");

        let connect = ConnectOptions {
            timeout_per_port: self.opts.connect_timeout,
            concurrency: self.opts.concurrency,
            retries: self.opts.retries,
            retry_delay: Duration::from_millis(50),
            qps: (self.opts.qps > 0).then(|| RateLimiter::new(self.opts.qps)),
            global_limit: Some(Arc::new(Semaphore::new(self.opts.concurrency.max(1)))),
        };
        let host_sem = Arc::new(Semaphore::new(self.opts.host_concurrency.max(1)));
        // Dropping `scans` (a cancelled detect) aborts every host task.
        let mut scans = JoinSet::new();

        for ip in hosts {
            let host_sem = host_sem.clone();
            let connect = connect.clone();
            let ports = self.opts.ports.clone();
            let client = self.client.clone();
            let probe_ms = self.opts.probe_timeout_ms;
            let web_only = self.opts.web_only;
            scans.spawn(async move {
                let Ok(_permit) = host_sem.acquire_owned().await else { return Vec::new() };
                let open = port_scan::scan_connect(ip, &ports, &connect).await;
                classify_host(&client, ip, open, probe_ms, web_only).await
            });
        }

        let mut found = Vec::new();
        while let Some(batch) = scans.join_next().await {
            match batch {
                Ok(batch) => found.extend(batch),
                Err(e) => warn!(error = %e, "host scan task failed"),
            }
        }
        found.sort_by(|a, b| (&a.ip, a.port).cmp(&(&b.ip, b.port)));
        Ok(found)
    }
}

async fn classify_host(client: &Client, ip: IpAddr, open: Vec<u16>, probe_ms: u64, web_only: bool) -> Vec<DetectedService> {
    let mut checks = JoinSet::new();
    for port in open {
        let client = client.clone();
        checks.spawn(async move { classify_port(&client, ip, port, probe_ms, web_only).await });
    }
    let mut out = Vec::new();
    while let Some(res) = checks.join_next().await {
        if let Ok(Some(svc)) = res {
            out.push(svc);
        }
    }
    out
}

/// Names one open port. `None` drops it from the result.
async fn classify_port(client: &Client, ip: IpAddr, port: u16, probe_ms: u64, web_only: bool) -> Option<DetectedService> {
    let hint = port_scan::service_hint(port);
    if hint == Some("ssh") {
        if web_only {
            return None;
        }
        let title = service_probe::grab_ssh_banner(ip, port, probe_ms).await.unwrap_or_default();
        return Some(DetectedService::new(ip.to_string(), port, "ssh", title));
    }
    if hint.is_none() {
        if let Some(hit) = service_probe::probe_web(client, ip, port).await {
            return Some(DetectedService::new(ip.to_string(), port, hit.scheme, hit.title.unwrap_or_default()));
        }
    }
    if web_only {
        return None;
    }
    Some(DetectedService::new(ip.to_string(), port, hint.unwrap_or("tcp"), ""))
}

#[async_trait]
impl Detector for NetworkDetector {
    fn name(&self) -> &str {
        "network"
    }

    #[instrument(skip(self), fields(ports = self.opts.ports.len()))]
    async fn detect(&self, target: &Target) -> Result<Vec<DetectedService>, DetectorError> {
        let found = self.run(target).await.map_err(|e| DetectorError::new(self.name(), format!("{e:#}")))?;
        info!(%target, found = found.len(), "network detection done");
        Ok(found)
    }
}
