//! Network discovery for OWServer hardware
//!
//! OWServers answer a single-byte UDP broadcast probe on port 30303 with a
//! near-JSON datagram. Older firmware appends a comma after the last field,
//! which has to be stripped before the payload parses. When auto-detection is
//! off, the server set comes from a static comma-delimited list instead.

use crate::config::DiscoveryConfig;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Default OWServer discovery port
pub const DISCOVERY_PORT: u16 = 30303;

/// Network discovery client for OWServers
#[derive(Debug, Clone)]
pub struct NetworkDiscovery {
    broadcast_address: String,
    port: u16,
    timeout: Duration,
    probe: Vec<u8>,
}

impl NetworkDiscovery {
    /// Create a discovery client broadcasting to `255.255.255.255:30303`
    pub fn new(timeout: Duration) -> Self {
        Self {
            broadcast_address: "255.255.255.255".to_string(),
            port: DISCOVERY_PORT,
            timeout,
            probe: b"D".to_vec(),
        }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            broadcast_address: config.broadcast_address.clone(),
            port: config.port,
            timeout: config.read_timeout,
            probe: config.probe.as_bytes().to_vec(),
        }
    }

    /// Send the probe somewhere other than the broadcast address
    pub fn with_target<S: Into<String>>(mut self, address: S, port: u16) -> Self {
        self.broadcast_address = address.into();
        self.port = port;
        self
    }

    /// Probe the network and collect every answering server address.
    ///
    /// Never fails: an unreachable network is logged and yields an empty
    /// set, any other socket error yields whatever was collected so far.
    pub async fn discover(&self) -> Vec<String> {
        let mut found = BTreeSet::new();

        debug!(
            "Broadcasting OWServer discovery probe to {}:{}",
            self.broadcast_address, self.port
        );

        if let Err(e) = self.collect(&mut found).await {
            warn!("OWServer discovery error: {}", e);
            settle_after_error(e.kind(), &mut found);
        }

        let mut servers: Vec<String> = found.into_iter().collect();
        sort_addresses(&mut servers);
        info!("Discovered {} OWServer(s)", servers.len());
        servers
    }

    async fn collect(&self, found: &mut BTreeSet<String>) -> std::io::Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        socket
            .send_to(&self.probe, (self.broadcast_address.as_str(), self.port))
            .await?;

        let mut buffer = [0u8; 2048];
        loop {
            match tokio::time::timeout(self.timeout, socket.recv_from(&mut buffer)).await {
                Ok(Ok((len, from))) => match parse_discovery_response(&buffer[..len]) {
                    Some(ip) => {
                        debug!("OWServer {} answered from {}", ip, from);
                        found.insert(ip);
                    }
                    None => debug!("Ignoring unparsable discovery reply from {}", from),
                },
                Ok(Err(e)) => return Err(e),
                // Quiet for a full read timeout: collection is over
                Err(_) => return Ok(()),
            }
        }
    }
}

/// Cut the JSON object out of a discovery datagram and drop a trailing
/// comma before the closing brace.
pub fn repair_payload(data: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(data);
    let start = text.find('{')?;
    let end = start + text[start..].find('}')?;

    let body = text[start + 1..end].trim_end();
    let body = body.strip_suffix(',').unwrap_or(body);
    Some(format!("{{{body}}}"))
}

/// Extract the `IP` field from a discovery datagram
pub fn parse_discovery_response(data: &[u8]) -> Option<String> {
    let payload = repair_payload(data)?;
    let json: serde_json::Value = serde_json::from_str(&payload).ok()?;
    json.get("IP")
        .and_then(|ip| ip.as_str())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Parse a static comma-delimited server list.
///
/// Entries are trimmed and deduplicated but otherwise not validated; a blank
/// entry between commas is kept and will fail its own fetch.
pub fn static_list(config: &str) -> Vec<String> {
    if config.trim().is_empty() {
        return Vec::new();
    }
    let unique: BTreeSet<String> = config
        .split(',')
        .map(|entry| entry.trim().to_string())
        .collect();
    let mut servers: Vec<String> = unique.into_iter().collect();
    sort_addresses(&mut servers);
    servers
}

/// Sort by IPv4 octets where possible, falling back to text order
pub fn sort_addresses(servers: &mut [String]) {
    servers.sort_by(|a, b| {
        let host = |s: &str| s.split(':').next().and_then(|h| h.parse::<Ipv4Addr>().ok());
        match (host(a), host(b)) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => a.cmp(b),
        }
    });
}

/// Decide what survives a socket error. An unreachable network yields no
/// servers; any other error keeps the replies collected so far.
fn settle_after_error(kind: ErrorKind, found: &mut BTreeSet<String>) {
    if kind == ErrorKind::NetworkUnreachable {
        warn!("The network is unreachable.");
        found.clear();
    }
}
