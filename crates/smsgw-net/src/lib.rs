//! Network configuration helper.
//!
//! Reads the host's interface state from `ip`, summarises and rewrites the
//! netplan YAML, applies it, and probes connectivity with `ping`.

pub mod error;
pub mod iproute;
pub mod manager;
pub mod netplan;

pub use error::NetworkError;
pub use manager::{ConnectivityReport, NetworkManager};
pub use netplan::{NetplanSummary, StaticConfig};
