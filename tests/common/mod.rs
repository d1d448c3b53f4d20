//! Common test utilities

#![allow(dead_code)]

pub mod owserver_mock;
pub mod test_fixtures;

pub use owserver_mock::MockOwServer;
pub use test_fixtures::*;
