//! Decode pipeline services
//!
//! Unit conversion, the per-family sensor tables, the device state store,
//! the decode dispatcher and dead-sensor detection.

pub mod dead_sensor;
pub mod dispatcher;
pub mod sensor_registry;
pub mod state_manager;
pub mod unit_converter;

pub use dead_sensor::DeadSensorMonitor;
pub use dispatcher::{dispatch, dispatch_server, DecodeOutcome, DispatchSummary, SkipReason};
pub use sensor_registry::{DeviceKind, SensorFamily, SensorTypeRegistry, StateImage};
pub use state_manager::{DeviceRecord, DeviceStore, DeviceUpdate, StateValue};
pub use unit_converter::{TemperatureUnit, UnitPreferences};
