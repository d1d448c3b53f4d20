//! Declared devices
//!
//! Devices are declared in the `[[devices]]` array of the configuration file
//! and turned into [`DeviceRecord`]s when the store is built.

use crate::error::{OwServerError, Result};
use crate::services::sensor_registry::{DeviceKind, SensorTypeRegistry};
use crate::services::state_manager::{DeviceRecord, DeviceStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_enabled() -> bool {
    true
}

/// One configured device entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceDefinition {
    /// Stable identifier
    pub id: String,

    /// Display name; defaults to the id
    #[serde(default)]
    pub name: Option<String>,

    /// `server`, a family tag (`DS18B20`) or a device type id (`owsTemperatureSensor`)
    #[serde(rename = "type")]
    pub device_type: String,

    /// Owning server address
    #[serde(default)]
    pub server: Option<String>,

    /// 1-Wire ROM ID; sensors without one wait until it is set
    #[serde(default)]
    pub rom_id: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Temperature compensation offset in degrees Celsius
    #[serde(default)]
    pub temp_compensation: f64,

    /// Primary value selector key (e.g. `T`, `HY`, `S_3`)
    #[serde(default)]
    pub primary_selector: Option<String>,
}

impl DeviceDefinition {
    pub fn kind(&self) -> Result<DeviceKind> {
        self.device_type.parse()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(OwServerError::config("device id cannot be empty"));
        }
        let kind = self.kind()?;
        if let Some(rom) = &self.rom_id {
            if kind.is_server() {
                return Err(OwServerError::config(format!(
                    "device '{}': servers have no ROM ID",
                    self.id
                )));
            }
            if rom.trim().is_empty() {
                return Err(OwServerError::config(format!(
                    "device '{}': ROM ID cannot be blank",
                    self.id
                )));
            }
        }
        if !self.temp_compensation.is_finite() {
            return Err(OwServerError::config(format!(
                "device '{}': temperature compensation must be a finite number",
                self.id
            )));
        }
        Ok(())
    }

    pub fn to_record(&self) -> Result<DeviceRecord> {
        let kind = self.kind()?;
        let mut record = DeviceRecord::new(
            self.id.clone(),
            self.display_name().to_string(),
            kind,
            self.server.as_ref().map(|s| s.trim().to_string()),
            self.rom_id.as_ref().map(|s| s.trim().to_string()),
        )
        .with_enabled(self.enabled)
        .with_compensation(self.temp_compensation);

        if let Some(selector) = &self.primary_selector {
            if let Some(family) = kind.family() {
                if SensorTypeRegistry::primary_value_selector(family, selector).is_none() {
                    warn!(
                        device = %self.display_name(),
                        "Primary value selector '{}' is not one of {:?}",
                        selector,
                        SensorTypeRegistry::selector_keys(family)
                    );
                }
            }
            record = record.with_selector(selector.clone());
        }
        Ok(record)
    }
}

/// Build the device store from declared devices
pub fn build_store(definitions: &[DeviceDefinition]) -> Result<DeviceStore> {
    let mut store = DeviceStore::new();
    for definition in definitions {
        definition.validate()?;
        store
            .insert(definition.to_record()?)
            .map_err(|e| OwServerError::config(e.to_string()))?;
    }
    Ok(store)
}
