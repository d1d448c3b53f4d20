//! Poller for EDS 1-Wire OWServer hardware
//!
//! Finds OWServers on the local network (or takes a static list), fetches
//! each server's `details.xml` on a fixed interval and decodes it into typed
//! per-device state.
//!
//! # Features
//!
//! - UDP discovery on port 30303, tolerant of the trailing-comma firmware quirk
//! - 19 sensor families decoded from one table-driven decoder
//! - Temperature compensation and °C/°F conversion with configurable precision
//! - Per-field degradation to `Unsupported` instead of failing a device
//! - Dead-sensor detection against the poll interval

// Core modules
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod scheduler;
pub mod services;

// Test support modules - available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export main types for convenience
pub use config::PollerConfig;
pub use error::{OwServerError, Result};
pub use scheduler::{CycleReport, PollingScheduler};
