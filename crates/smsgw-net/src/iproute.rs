//! Parsers for `ip link show` and `ip addr show` text output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Up,
    #[default]
    Down,
}

/// Addresses and link state of one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDetails {
    /// IPv4 addresses in CIDR notation.
    pub ip_addresses: Vec<String>,
    pub mac_address: Option<String>,
    pub status: LinkStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub details: InterfaceDetails,
}

/// Names of interfaces reported `state UP`, in `ip` order, skipping any
/// whose name starts with one of `ignored_prefixes`.
///
/// Header lines look like
/// `2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ... state UP ...`;
/// `veth0@if4` style names lose their `@peer` suffix.
pub fn parse_active_interfaces(link_show: &str, ignored_prefixes: &[String]) -> Vec<String> {
    link_show
        .lines()
        .filter(|line| line.contains(": ") && line.contains("state UP"))
        .filter_map(|line| line.split(": ").nth(1))
        .map(|field| field.split('@').next().unwrap_or(field).trim().to_string())
        .filter(|name| {
            !name.is_empty() && !ignored_prefixes.iter().any(|p| name.starts_with(p.as_str()))
        })
        .collect()
}

/// Status, MAC and IPv4 addresses from `ip addr show <iface>`.
pub fn parse_interface_details(addr_show: &str) -> InterfaceDetails {
    let mut details = InterfaceDetails::default();

    for line in addr_show.lines().map(str::trim) {
        if line.contains("state UP") {
            details.status = LinkStatus::Up;
        } else if line.starts_with("link/ether") {
            if let Some(mac) = line.split_whitespace().nth(1) {
                details.mac_address = Some(mac.to_string());
            }
        } else if line.starts_with("inet ") {
            if let Some(addr) = line.split_whitespace().nth(1) {
                details.ip_addresses.push(addr.to_string());
            }
        }
    }

    details
}
