//! Polling scheduler
//!
//! Drives the repeating cycle: dead-sensor sweep, server resolution, then a
//! sequential fetch and dispatch per server, then sleep until the interval
//! has elapsed since the cycle started. A stop request takes effect between
//! servers or between cycles, never during a request.

use crate::client::{poll_server, DetailsFetcher, OwServerHttpClient, PollOutcome};
use crate::config::{build_store, FailureScope, PollerConfig};
use crate::discovery::network::{static_list, NetworkDiscovery};
use crate::error::{OwServerError, Result};
use crate::services::dead_sensor::DeadSensorMonitor;
use crate::services::dispatcher::dispatch_server;
use crate::services::state_manager::DeviceStore;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What happened in one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Servers whose details.xml was fetched and parsed
    pub servers_polled: usize,
    pub sensors_updated: usize,
    pub servers_failed: Vec<String>,
    /// Names of devices that went offline this cycle
    pub newly_offline: Vec<String>,
}

/// Sequential poller over all configured servers
pub struct PollingScheduler {
    config: PollerConfig,
    store: DeviceStore,
    fetcher: Arc<dyn DetailsFetcher>,
    discovery: NetworkDiscovery,
    monitor: DeadSensorMonitor,
}

impl PollingScheduler {
    pub fn new(config: PollerConfig, store: DeviceStore, fetcher: Arc<dyn DetailsFetcher>) -> Self {
        let discovery = NetworkDiscovery::from_config(&config.discovery);
        let monitor = DeadSensorMonitor::new(config.polling.interval);
        Self {
            config,
            store,
            fetcher,
            discovery,
            monitor,
        }
    }

    /// Build the store from declared devices and fetch over HTTP
    pub fn from_config(config: PollerConfig) -> Result<Self> {
        let store = build_store(&config.devices)?;
        let fetcher = Arc::new(OwServerHttpClient::new(config.polling.fetch_timeout)?);
        Ok(Self::new(config, store, fetcher))
    }

    pub fn with_discovery(mut self, discovery: NetworkDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DeviceStore {
        &mut self.store
    }

    /// Current server address list: discovered or static
    pub async fn resolve_servers(&self) -> Vec<String> {
        if self.config.servers.auto_detect {
            self.discovery.discover().await
        } else {
            static_list(&self.config.servers.addresses)
        }
    }

    /// Run one complete cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle(None).await
    }

    async fn cycle(&mut self, cancel: Option<&CancellationToken>) -> CycleReport {
        let mut report = CycleReport::default();

        let swept = self.monitor.sweep(&mut self.store, Utc::now());
        report.newly_offline.extend(swept.into_iter().map(|d| d.name));

        let servers = self.resolve_servers().await;
        if servers.is_empty() {
            if self.config.servers.auto_detect {
                let err = OwServerError::discovery("no OWServer answered the discovery probe");
                warn!(code = err.to_error_code().as_number(), "{}", err);
            } else {
                warn!("No OWServers to poll");
            }
        }

        for server in &servers {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                info!("Stop requested; ending cycle early");
                break;
            }

            match poll_server(self.fetcher.as_ref(), server).await {
                PollOutcome::Success(snapshot) => {
                    let summary = dispatch_server(
                        &mut self.store,
                        &snapshot,
                        server,
                        &self.config.units,
                        Utc::now(),
                    );
                    debug!(
                        server = %server,
                        sensors = summary.sensors_updated,
                        failed = summary.failed,
                        "Dispatch complete"
                    );
                    report.servers_polled += 1;
                    report.sensors_updated += summary.sensors_updated;
                }
                PollOutcome::Failure(failure) => {
                    error!(
                        server = %server,
                        code = failure.code.as_number(),
                        category = failure.code.category(),
                        "Poll failed: {}", failure.reason
                    );
                    let offline = self.mark_failed_server(server);
                    report.newly_offline.extend(offline);
                    report.servers_failed.push(server.clone());
                }
            }
        }

        if !self.config.polling.suppress_results_logging {
            info!("Total of {} servers polled.", report.servers_polled);
            info!("Total of {} devices updated.", report.sensors_updated);
        }

        report
    }

    /// Take devices offline after a failed fetch, per the configured scope.
    /// Returns the names of devices that were online.
    fn mark_failed_server(&mut self, server: &str) -> Vec<String> {
        let scope = self.config.polling.failure_scope;
        let targets: Vec<(String, String)> = self
            .store
            .devices()
            .filter(|d| d.enabled)
            .filter(|d| scope == FailureScope::All || d.server() == Some(server))
            .map(|d| (d.id.clone(), d.name.clone()))
            .collect();

        let mut offline = Vec::new();
        for (id, name) in targets {
            match self.store.mark_offline(&id) {
                Ok(true) => offline.push(name),
                Ok(false) => {}
                Err(e) => warn!(device = %name, "Unable to set device offline: {}", e),
            }
        }
        offline
    }

    /// Poll until `cancel` fires
    pub async fn run_forever(&mut self, cancel: CancellationToken) {
        info!(
            "Polling every {:?} (fetch timeout {:?})",
            self.config.polling.interval, self.config.polling.fetch_timeout
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let report = self.cycle(Some(&cancel)).await;
            debug!(?report, "Cycle finished in {:?}", started.elapsed());

            let remaining = self.config.polling.interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        info!("Polling stopped");
    }

    /// ROM IDs reported by every reachable server
    pub async fn sensor_list(&self) -> Vec<(String, Vec<String>)> {
        let mut listing = Vec::new();
        for server in self.resolve_servers().await {
            match poll_server(self.fetcher.as_ref(), &server).await {
                PollOutcome::Success(snapshot) => {
                    let roms = snapshot.rom_ids();
                    info!(server = %server, "{} sensors: {}", roms.len(), roms.join(", "));
                    listing.push((server, roms));
                }
                PollOutcome::Failure(failure) => {
                    warn!(server = %server, "Unable to list sensors: {}", failure);
                }
            }
        }
        listing
    }

    /// Log the raw details.xml of every server, optionally also writing it
    /// to a dated file in `dir`. Returns each server with whether it passed.
    pub async fn dump_details(&self, dir: Option<&Path>) -> Result<Vec<(String, bool)>> {
        let servers = self.resolve_servers().await;
        let mut results = Vec::with_capacity(servers.len());
        let mut dump = String::new();

        for server in servers {
            match self.fetcher.fetch_raw(&server).await {
                Ok(body) => {
                    info!(server = %server, "passed");
                    info!("{}", body);
                    dump.push_str(&format!("\n{server}\n{body}\n"));
                    results.push((server, true));
                }
                Err(e) => {
                    warn!(server = %server, "failed: {}", e);
                    results.push((server, false));
                }
            }
        }

        if let Some(dir) = dir {
            let path = write_dump(dir, &dump).await?;
            info!("details.xml dump written to {}", path.display());
        }

        Ok(results)
    }
}

async fn write_dump(dir: &Path, body: &str) -> Result<PathBuf> {
    let now = Utc::now();
    let path = dir.join(format!("{} OWServer.txt", now.format("%Y-%m-%d")));
    let mut content = String::from("OWServer details.xml Log\n");
    content.push_str(&format!("Written at: {}\n", now.format("%Y-%m-%d %H:%M:%S")));
    content.push_str(&"=".repeat(72));
    content.push('\n');
    content.push_str(body);
    tokio::fs::write(&path, content).await?;
    Ok(path)
}
