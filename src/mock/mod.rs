//! Mock implementations for testing
//!
//! A canned-response [`DetailsFetcher`] and small builders for
//! `details.xml` documents.

use crate::client::details_parser::OWSERVER_NAMESPACE;
use crate::client::DetailsFetcher;
use crate::error::{OwServerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// MAC address reported by documents built with [`details_xml`]
pub const MOCK_MAC_ADDRESS: &str = "00:04:A3:00:00:01";

/// Mock fetcher serving fixed bodies per server address
#[derive(Default)]
pub struct MockFetcher {
    responses: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `server`; unknown servers fail like a refused connection
    pub fn with_response<S: Into<String>>(mut self, server: S, body: String) -> Self {
        self.responses.insert(server.into(), body);
        self
    }

    /// Servers requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DetailsFetcher for MockFetcher {
    async fn fetch_raw(&self, server: &str) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(server.to_string());
        }
        self.responses
            .get(server)
            .cloned()
            .ok_or_else(|| OwServerError::fetch(format!("connection refused by {server}")))
    }
}

/// Builder for one `owd_<Family>` element
#[derive(Debug, Clone)]
pub struct SensorXml {
    family_tag: String,
    fields: Vec<(String, String)>,
}

impl SensorXml {
    /// Element with `Name` and `ROMId` filled in
    pub fn new(family_tag: &str, rom_id: &str) -> Self {
        Self {
            family_tag: family_tag.to_string(),
            fields: vec![
                ("Name".to_string(), family_tag.to_string()),
                ("ROMId".to_string(), rom_id.to_string()),
            ],
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    fn render(&self, out: &mut String) {
        out.push_str(&format!("<owd_{}>\n", self.family_tag));
        for (name, value) in &self.fields {
            out.push_str(&format!("<{name}>{}</{name}>\n", escape(value)));
        }
        out.push_str(&format!("</owd_{}>\n", self.family_tag));
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// A complete `details.xml` body holding the given sensors.
///
/// `DevicesConnected` reports the number of sensors.
pub fn details_xml(sensors: &[SensorXml]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<Devices-Detail-Response xmlns=\"{OWSERVER_NAMESPACE}\">\n"
    ));
    for (name, value) in [
        ("PollCount", "1".to_string()),
        ("DevicesConnected", sensors.len().to_string()),
        ("DevicesConnectedChannel1", sensors.len().to_string()),
        ("DataErrors", "0".to_string()),
        ("DeviceName", "OWServer_v2-Enet".to_string()),
        ("HostName", "EDSOWServer".to_string()),
        ("MACAddress", MOCK_MAC_ADDRESS.to_string()),
    ] {
        out.push_str(&format!("<{name}>{value}</{name}>\n"));
    }
    for sensor in sensors {
        sensor.render(&mut out);
    }
    out.push_str("</Devices-Detail-Response>\n");
    out
}
