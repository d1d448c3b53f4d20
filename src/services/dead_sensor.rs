//! Dead-sensor detection
//!
//! A device whose state has not been updated for longer than one poll
//! interval plus a fixed grace period is flagged offline.

use crate::services::state_manager::{DeviceRecord, DeviceStore};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{error, warn};

/// Slack added to the poll interval before a device counts as dead
pub const GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Whether a device last updated `elapsed` ago is stale. The boundary itself is not.
pub fn is_stale(elapsed: Duration, poll_interval: Duration) -> bool {
    elapsed > poll_interval + GRACE_PERIOD
}

#[derive(Debug, Clone)]
pub struct DeadSensorMonitor {
    poll_interval: Duration,
}

impl DeadSensorMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn threshold(&self) -> Duration {
        self.poll_interval + GRACE_PERIOD
    }

    /// Flag every stale enabled device offline.
    ///
    /// Each stale device is logged on every sweep; the returned records are
    /// only those that were online before this sweep.
    pub fn sweep(&self, store: &mut DeviceStore, now: DateTime<Utc>) -> Vec<DeviceRecord> {
        let stale: Vec<(String, String, Duration)> = store
            .devices()
            .filter(|d| d.enabled)
            .filter_map(|d| {
                // A timestamp in the future counts as just updated
                let elapsed = (now - d.last_changed).to_std().unwrap_or_default();
                is_stale(elapsed, self.poll_interval).then(|| (d.id.clone(), d.name.clone(), elapsed))
            })
            .collect();

        let mut newly_offline = Vec::new();
        for (id, name, elapsed) in stale {
            warn!(
                device = %name,
                elapsed_secs = elapsed.as_secs(),
                "{} hasn't been updated in {} seconds, marking offline",
                name,
                elapsed.as_secs()
            );
            match store.mark_offline(&id) {
                Ok(true) => {
                    if let Some(record) = store.get(&id) {
                        newly_offline.push(record.clone());
                    }
                }
                Ok(false) => {}
                Err(e) => error!(device = %name, "Unable to set device offline: {}", e),
            }
        }
        newly_offline
    }
}
