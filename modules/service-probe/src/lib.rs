//! Naming an open port: HTTP(S) page titles and SSH banners.

use anyhow::{anyhow, Result};
use reqwest::{redirect::Policy, Client};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

const MAX_BODY: usize = 256 * 1024;

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout_ms: u64,
    pub redirects: usize,
    pub user_agent: String,
}

/// A port that answered like a web application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebHit {
    pub scheme: &'static str,
    pub status: u16,
    pub title: Option<String>,
}

/// Self-signed certificates are the norm on a LAN, so verification is off.
pub fn build_client(opts: &ProbeOptions) -> Result<Client> {
    Ok(Client::builder()
        .redirect(Policy::limited(opts.redirects))
        .timeout(Duration::from_millis(opts.timeout_ms))
        .user_agent(opts.user_agent.clone())
        .danger_accept_invalid_certs(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()?)
}

/// Schemes to try for a port, most likely first.
pub fn scheme_order(port: u16) -> [&'static str; 2] {
    match port {
        443 | 8443 | 9443 | 5001 | 8920 => ["https", "http"],
        _ => ["http", "https"],
    }
}

/// Fetch `/` and accept the port as web only if it serves HTML.
pub async fn probe_web(client: &Client, ip: IpAddr, port: u16) -> Option<WebHit> {
    let host = match ip {
        IpAddr::V6(v6) => format!("[{v6}]"),
        IpAddr::V4(v4) => v4.to_string(),
    };
    for scheme in scheme_order(port) {
        let url = format!("{scheme}://{host}:{port}/");
        match fetch_page(client, &url).await {
            Ok(Some((status, title))) => return Some(WebHit { scheme, status, title }),
            Ok(None) => return None,
            Err(e) => trace!(%url, error = %e, "web probe failed"),
        }
    }
    None
}

/// `Ok(None)`: the port speaks this scheme but is not a web page.
async fn fetch_page(client: &Client, url: &str) -> Result<Option<(u16, Option<String>)>> {
    let resp = client.get(url).send().await?;
    let status = resp.status().as_u16();
    if status >= 500 {
        return Ok(None);
    }
    let is_text = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| {
            let s = s.to_ascii_lowercase();
            s.contains("html") || s.contains("text")
        })
        .unwrap_or(false);
    if !is_text {
        return Ok(None);
    }
    let bytes = resp.bytes().await?;
    let body = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_BODY)]);
    let lower = body.to_ascii_lowercase();
    if !lower.contains("<html") && !lower.contains("<title") {
        return Ok(None);
    }
    Ok(Some((status, extract_title(&body))))
}

pub fn extract_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let start = lower.find("<title")?;
    let gt = start + lower[start..].find('>')?;
    let end = gt + lower[gt..].find("</title")?;
    let raw = &body[gt + 1..end];
    let title = decode_entities(&raw.split_whitespace().collect::<Vec<_>>().join(" "));
    (!title.is_empty()).then_some(title)
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Read the identification line an SSH server sends on connect and turn it
/// into a product label, e.g. `SSH-2.0-OpenSSH_9.2p1 Debian` -> `OpenSSH 9.2p1 Debian`.
pub async fn grab_ssh_banner(ip: IpAddr, port: u16, timeout_ms: u64) -> Result<String> {
    let limit = Duration::from_millis(timeout_ms);
    let mut stream = timeout(limit, TcpStream::connect(SocketAddr::new(ip, port))).await??;
    let mut buf = vec![0u8; 256];
    let n = timeout(limit, stream.read(&mut buf)).await??;
    let line = String::from_utf8_lossy(&buf[..n]);
    let line = line.lines().next().unwrap_or("").trim();
    let software = line
        .strip_prefix("SSH-")
        .and_then(|rest| rest.split_once('-'))
        .map(|(_, software)| software)
        .ok_or_else(|| anyhow!("not an ssh identification line: {line:?}"))?;
    Ok(software.replacen('_', " ", 1))
}
