//! Discovery of OWServer hardware on the local network

pub mod network;

pub use network::{parse_discovery_response, static_list, NetworkDiscovery, DISCOVERY_PORT};
