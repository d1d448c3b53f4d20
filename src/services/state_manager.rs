//! Live device state store
//!
//! Holds every configured device (servers and sensors) with its decoded
//! state map, availability flag and the timestamp of its last update. The
//! polling loop is the only writer: decoded updates are applied here after
//! each server's dispatch pass, and the dead-sensor sweep flips
//! availability off.

use crate::error::{OwServerError, Result};
use crate::services::sensor_registry::{DeviceKind, SensorFamily, StateImage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Value stored for a single state key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateValue {
    Text(String),
    /// The field was absent or could not be decoded this cycle
    Unsupported,
}

impl StateValue {
    pub fn text<S: Into<String>>(value: S) -> Self {
        StateValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            StateValue::Unsupported => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, StateValue::Unsupported)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Text(s) => f.write_str(s),
            StateValue::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// Per-device configuration properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProps {
    /// Additive correction applied to measured temperatures, in Celsius
    pub temp_compensation: f64,
    /// Headline value selector key; the family default when unset
    pub primary_selector: Option<String>,
    /// ROM ID for sensors, MAC address for servers
    pub address: Option<String>,
    /// Read-back configuration fields, keyed by XML field name
    pub mirror: BTreeMap<String, String>,
}

/// One configured logical device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub kind: DeviceKind,
    pub server_address: Option<String>,
    pub rom_id: Option<String>,
    pub enabled: bool,
    pub props: DeviceProps,
    pub states: BTreeMap<String, StateValue>,
    pub primary_value: Option<StateValue>,
    pub online: bool,
    pub image: Option<StateImage>,
    pub last_changed: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new_server<S: Into<String>>(id: S, name: S, server_address: S) -> Self {
        Self::new(id.into(), name.into(), DeviceKind::Server, Some(server_address.into()), None)
    }

    pub fn new_sensor<S: Into<String>>(
        id: S,
        name: S,
        family: SensorFamily,
        server_address: S,
        rom_id: S,
    ) -> Self {
        Self::new(
            id.into(),
            name.into(),
            DeviceKind::Sensor(family),
            Some(server_address.into()),
            Some(rom_id.into()),
        )
    }

    pub fn new(
        id: String,
        name: String,
        kind: DeviceKind,
        server_address: Option<String>,
        rom_id: Option<String>,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            server_address,
            rom_id,
            enabled: true,
            props: DeviceProps::default(),
            states: BTreeMap::new(),
            primary_value: None,
            online: false,
            image: None,
            last_changed: Utc::now(),
        }
    }

    pub fn with_compensation(mut self, offset: f64) -> Self {
        self.props.temp_compensation = offset;
        self
    }

    pub fn with_selector<S: Into<String>>(mut self, key: S) -> Self {
        self.props.primary_selector = Some(key.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_last_changed(mut self, at: DateTime<Utc>) -> Self {
        self.last_changed = at;
        self
    }

    fn non_blank(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn server(&self) -> Option<&str> {
        Self::non_blank(&self.server_address)
    }

    pub fn rom(&self) -> Option<&str> {
        Self::non_blank(&self.rom_id)
    }

    /// A server needs its address, a sensor needs its address and ROM ID
    pub fn is_configured(&self) -> bool {
        match self.kind {
            DeviceKind::Server => self.server().is_some(),
            DeviceKind::Sensor(_) => self.server().is_some() && self.rom().is_some(),
        }
    }

    /// Uniqueness key: server address plus ROM ID (none for servers)
    pub fn identity(&self) -> (Option<&str>, Option<&str>) {
        match self.kind {
            DeviceKind::Server => (self.server(), None),
            DeviceKind::Sensor(_) => (self.server(), self.rom()),
        }
    }

    pub fn state(&self, key: &str) -> Option<&StateValue> {
        self.states.get(key)
    }

    /// Selector key in effect, falling back to the family default
    pub fn selector_key(&self) -> Option<&str> {
        let family = self.kind.family()?;
        Some(
            self.props
                .primary_selector
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| family.default_selector()),
        )
    }
}

/// Changes decoded for one device in one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceUpdate {
    pub states: Vec<(String, StateValue)>,
    /// New primary value and its image; `None` leaves both untouched
    pub primary: Option<(StateValue, StateImage)>,
    pub address: Option<String>,
    pub mirror: Vec<(String, String)>,
}

/// Store of all configured devices, keyed by device id
#[derive(Debug, Default)]
pub struct DeviceStore {
    devices: BTreeMap<String, DeviceRecord>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device. Ids and (server, ROM ID) identities must be unique.
    pub fn insert(&mut self, record: DeviceRecord) -> Result<()> {
        if self.devices.contains_key(&record.id) {
            return Err(OwServerError::invalid_input(format!(
                "duplicate device id '{}'",
                record.id
            )));
        }
        if record.is_configured() {
            let identity = record.identity();
            if let Some(existing) = self
                .devices
                .values()
                .find(|d| d.is_configured() && d.kind.is_server() == record.kind.is_server() && d.identity() == identity)
            {
                return Err(OwServerError::invalid_input(format!(
                    "device '{}' has the same identity as '{}'",
                    record.name, existing.name
                )));
            }
        }
        debug!(device = %record.name, kind = %record.kind, "Device registered");
        self.devices.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut DeviceRecord> {
        self.devices
            .get_mut(id)
            .ok_or_else(|| OwServerError::not_found(format!("device '{id}'")))
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Ids of devices bound to a server address
    pub fn ids_for_server(&self, server: &str) -> Vec<String> {
        self.devices
            .values()
            .filter(|d| d.server() == Some(server))
            .map(|d| d.id.clone())
            .collect()
    }

    /// Apply a decoded update and mark the device online
    pub fn apply(&mut self, id: &str, update: DeviceUpdate, now: DateTime<Utc>) -> Result<()> {
        let device = self.get_mut(id)?;
        for (key, value) in update.states {
            device.states.insert(key, value);
        }
        if let Some((value, image)) = update.primary {
            device.primary_value = Some(value);
            device.image = Some(image);
        }
        if let Some(address) = update.address {
            device.props.address = Some(address);
        }
        for (field, value) in update.mirror {
            device.props.mirror.insert(field, value);
        }
        device.online = true;
        device.last_changed = now;
        Ok(())
    }

    /// Mark a device offline with the error image after a failed decode
    pub fn mark_failed(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let device = self.get_mut(id)?;
        device.online = false;
        device.image = Some(StateImage::Error);
        device.last_changed = now;
        Ok(())
    }

    /// Flip availability off. Returns whether the device was online.
    ///
    /// The update timestamp is left alone so staleness keeps accumulating.
    pub fn mark_offline(&mut self, id: &str) -> Result<bool> {
        let device = self.get_mut(id)?;
        let was_online = device.online;
        device.online = false;
        Ok(was_online)
    }

    /// Enable or disable every device. Disabled devices also go offline.
    pub fn set_all_enabled(&mut self, enabled: bool) {
        for device in self.devices.values_mut() {
            device.enabled = enabled;
            if !enabled {
                device.online = false;
            }
        }
        info!(
            "{} {} devices",
            if enabled { "Enabled" } else { "Disabled" },
            self.devices.len()
        );
    }
}
