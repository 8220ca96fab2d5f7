//! Netplan document handling.
//!
//! Existing files are read as an untyped [`serde_yaml::Value`] so that key
//! order and fields we do not model survive into `raw_config`. Rewritten
//! files are rendered from the typed [`NetplanDocument`].

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::error::NetworkError;

/// The gateway-relevant view of a netplan file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetplanSummary {
    pub interface_name: String,
    pub primary_ip: Option<String>,
    pub secondary_ip: Option<String>,
    pub subnet_mask: Option<String>,
    pub gateway: Option<String>,
    pub dns_primary: Option<String>,
    pub dns_secondary: Option<String>,
    pub raw_config: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressRole {
    Primary,
    Secondary,
    Other,
}

/// Private LAN ranges hold the primary address; the `10.0.0.0/24`
/// management network holds the secondary one.
fn classify(address: &str) -> AddressRole {
    let ip = address.split('/').next().unwrap_or(address);
    match ip.parse::<Ipv4Addr>().map(|ip| ip.octets()) {
        Ok([192, 168, _, _]) | Ok([172, _, _, _]) => AddressRole::Primary,
        Ok([10, 0, 0, _]) => AddressRole::Secondary,
        _ => AddressRole::Other,
    }
}

/// Netplan allows both `- 10.0.0.1/24` and `- 10.0.0.1/24: {lifetime: 0}`.
fn address_entries(iface: &Value) -> Vec<String> {
    iface
        .get("addresses")
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(|entry| match entry {
                    Value::String(s) => Some(s.clone()),
                    Value::Mapping(m) => m.keys().next().and_then(Value::as_str).map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn default_gateway(iface: &Value) -> Option<String> {
    let from_routes = iface
        .get("routes")
        .and_then(Value::as_sequence)
        .and_then(|routes| {
            routes.iter().find_map(|route| {
                let to = route.get("to").and_then(Value::as_str)?;
                if to == "default" || to == "0.0.0.0/0" {
                    route.get("via").and_then(Value::as_str).map(str::to_string)
                } else {
                    None
                }
            })
        });

    from_routes.or_else(|| {
        iface
            .get("gateway4")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

/// Summarise the first `network.ethernets` entry of a parsed netplan file.
pub fn summarize(config: &Value) -> Result<NetplanSummary, NetworkError> {
    let (name, iface) = config
        .get("network")
        .and_then(|n| n.get("ethernets"))
        .and_then(Value::as_mapping)
        .and_then(|ethernets| ethernets.iter().next())
        .ok_or(NetworkError::NoEthernet)?;

    let interface_name = match name {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    };

    let addresses = address_entries(iface);
    let primary = addresses
        .iter()
        .find(|a| classify(a) == AddressRole::Primary)
        .or_else(|| addresses.first());
    let secondary_ip = addresses
        .iter()
        .find(|a| classify(a) == AddressRole::Secondary)
        .cloned();

    let (primary_ip, subnet_mask) = match primary {
        Some(addr) => match addr.split_once('/') {
            Some((ip, prefix)) => (Some(ip.to_string()), Some(prefix.to_string())),
            None => (Some(addr.clone()), Some("24".to_string())),
        },
        None => (None, None),
    };

    let dns: Vec<String> = iface
        .get("nameservers")
        .and_then(|n| n.get("addresses"))
        .and_then(Value::as_sequence)
        .map(|seq| {
            seq.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(NetplanSummary {
        interface_name,
        primary_ip,
        secondary_ip,
        subnet_mask,
        gateway: default_gateway(iface),
        dns_primary: dns.first().cloned(),
        dns_secondary: dns.get(1).cloned(),
        raw_config: config.clone(),
    })
}

// ── Static configuration ────────────────────────────────────────────

/// A complete static addressing plan for the primary interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticConfig {
    pub primary_ip: String,
    /// Prefix length (`24`) or dotted mask (`255.255.255.0`).
    pub subnet_mask: String,
    pub gateway: String,
    pub dns_primary: String,
    pub dns_secondary: String,
    /// Secondary address, with or without a prefix.
    pub secondary_ip: String,
}

impl StaticConfig {
    /// Build from optional CLI values; every value must be present and non-empty.
    pub fn from_parts(
        primary_ip: Option<String>,
        subnet_mask: Option<String>,
        gateway: Option<String>,
        dns_primary: Option<String>,
        dns_secondary: Option<String>,
        secondary_ip: Option<String>,
    ) -> Result<Self, NetworkError> {
        fn required(v: Option<String>) -> Result<String, NetworkError> {
            match v.map(|s| s.trim().to_string()) {
                Some(s) if !s.is_empty() => Ok(s),
                _ => Err(NetworkError::MissingParameters),
            }
        }

        let config = Self {
            primary_ip: required(primary_ip)?,
            subnet_mask: required(subnet_mask)?,
            gateway: required(gateway)?,
            dns_primary: required(dns_primary)?,
            dns_secondary: required(dns_secondary)?,
            secondary_ip: required(secondary_ip)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), NetworkError> {
        check_ipv4("primary_ip", &self.primary_ip)?;
        check_ipv4("gateway", &self.gateway)?;
        check_ipv4("dns_primary", &self.dns_primary)?;
        check_ipv4("dns_secondary", &self.dns_secondary)?;
        self.prefix_len()?;

        match self.secondary_ip.split_once('/') {
            Some((ip, prefix)) => {
                check_ipv4("secondary_ip", ip)?;
                match prefix.parse::<u8>() {
                    Ok(p) if p <= 32 => {}
                    _ => return Err(invalid("secondary_ip", &self.secondary_ip)),
                }
            }
            None => check_ipv4("secondary_ip", &self.secondary_ip)?,
        }
        Ok(())
    }

    /// The subnet mask as a prefix length.
    pub fn prefix_len(&self) -> Result<u8, NetworkError> {
        if let Ok(prefix) = self.subnet_mask.parse::<u8>() {
            return if prefix <= 32 {
                Ok(prefix)
            } else {
                Err(invalid("subnet_mask", &self.subnet_mask))
            };
        }
        let mask = self
            .subnet_mask
            .parse::<Ipv4Addr>()
            .map_err(|_| invalid("subnet_mask", &self.subnet_mask))?;
        let bits = u32::from(mask);
        let prefix = bits.leading_ones();
        // Contiguous masks only.
        if bits.checked_shl(prefix).unwrap_or(0) != 0 {
            return Err(invalid("subnet_mask", &self.subnet_mask));
        }
        Ok(prefix as u8)
    }

    /// Render the netplan document for `interface`.
    pub fn to_document(&self, interface: &str) -> Result<NetplanDocument, NetworkError> {
        let prefix = self.prefix_len()?;
        let ethernet = EthernetConfig {
            addresses: vec![
                format!("{}/{}", self.primary_ip, prefix),
                self.secondary_ip.clone(),
            ],
            routes: vec![Route {
                to: "default".into(),
                via: self.gateway.clone(),
            }],
            nameservers: Nameservers {
                addresses: vec![self.dns_primary.clone(), self.dns_secondary.clone()],
            },
        };

        Ok(NetplanDocument {
            network: NetworkSection {
                version: 2,
                renderer: "networkd".into(),
                ethernets: BTreeMap::from([(interface.to_string(), ethernet)]),
            },
        })
    }
}

fn invalid(field: &'static str, value: &str) -> NetworkError {
    NetworkError::InvalidParameter {
        field,
        value: value.to_string(),
    }
}

fn check_ipv4(field: &'static str, value: &str) -> Result<(), NetworkError> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| invalid(field, value))
}

// ── Rendered document ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetplanDocument {
    pub network: NetworkSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSection {
    pub version: u8,
    pub renderer: String,
    pub ethernets: BTreeMap<String, EthernetConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthernetConfig {
    pub addresses: Vec<String>,
    pub routes: Vec<Route>,
    pub nameservers: Nameservers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub to: String,
    pub via: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nameservers {
    pub addresses: Vec<String>,
}

impl NetplanDocument {
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTALLER_YAML: &str = "\
network:
  version: 2
  renderer: networkd
  ethernets:
    enp3s0:
      addresses:
        - 10.0.0.20/24
        - 192.168.10.5/23
      routes:
        - to: 10.8.0.0/16
          via: 10.0.0.1
        - to: default
          via: 192.168.10.1
      nameservers:
        addresses: [1.1.1.1, 9.9.9.9]
    enp4s0:
      dhcp4: true
";

    fn parse(raw: &str) -> Value {
        serde_yaml::from_str(raw).unwrap()
    }

    #[test]
    fn summary_of_static_config() {
        let s = summarize(&parse(INSTALLER_YAML)).unwrap();
        assert_eq!(s.interface_name, "enp3s0");
        assert_eq!(s.primary_ip.as_deref(), Some("192.168.10.5"));
        assert_eq!(s.subnet_mask.as_deref(), Some("23"));
        assert_eq!(s.secondary_ip.as_deref(), Some("10.0.0.20/24"));
        assert_eq!(s.gateway.as_deref(), Some("192.168.10.1"));
        assert_eq!(s.dns_primary.as_deref(), Some("1.1.1.1"));
        assert_eq!(s.dns_secondary.as_deref(), Some("9.9.9.9"));
    }

    #[test]
    fn legacy_gateway4_and_bare_address() {
        let s = summarize(&parse(
            "network:\n  ethernets:\n    eth0:\n      addresses: [172.20.0.9]\n      gateway4: 172.20.0.1\n",
        ))
        .unwrap();
        assert_eq!(s.primary_ip.as_deref(), Some("172.20.0.9"));
        assert_eq!(s.subnet_mask.as_deref(), Some("24"));
        assert_eq!(s.gateway.as_deref(), Some("172.20.0.1"));
        assert_eq!(s.secondary_ip, None);
        assert_eq!(s.dns_primary, None);
    }

    #[test]
    fn public_address_falls_back_to_first() {
        let s = summarize(&parse(
            "network:\n  ethernets:\n    eth0:\n      addresses:\n        - 10.0.0.7/24\n        - 203.0.113.4/28: {lifetime: 0}\n",
        ))
        .unwrap();
        assert_eq!(s.primary_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(s.subnet_mask.as_deref(), Some("24"));
        assert_eq!(s.secondary_ip.as_deref(), Some("10.0.0.7/24"));
    }

    #[test]
    fn lone_secondary_range_address_is_primary() {
        let s = summarize(&parse(
            "network:\n  ethernets:\n    eth0:\n      addresses: [10.0.0.7/24]\n",
        ))
        .unwrap();
        assert_eq!(s.primary_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(s.subnet_mask.as_deref(), Some("24"));
    }

    #[test]
    fn dhcp_only_interface_has_no_addresses() {
        let s = summarize(&parse("network:\n  ethernets:\n    eth0:\n      dhcp4: true\n")).unwrap();
        assert_eq!(s.interface_name, "eth0");
        assert_eq!(s.primary_ip, None);
        assert_eq!(s.gateway, None);
    }

    #[test]
    fn missing_ethernets_is_an_error() {
        let err = summarize(&parse("network:\n  version: 2\n  wifis: {}\n")).unwrap_err();
        assert!(matches!(err, NetworkError::NoEthernet));
        let err = summarize(&parse("network:\n  ethernets: {}\n")).unwrap_err();
        assert!(matches!(err, NetworkError::NoEthernet));
    }

    fn plan() -> StaticConfig {
        StaticConfig {
            primary_ip: "192.168.1.10".into(),
            subnet_mask: "24".into(),
            gateway: "192.168.1.1".into(),
            dns_primary: "8.8.8.8".into(),
            dns_secondary: "8.8.4.4".into(),
            secondary_ip: "10.0.0.10/24".into(),
        }
    }

    #[test]
    fn missing_parameter_rejected() {
        let err = StaticConfig::from_parts(
            Some("192.168.1.10".into()),
            Some("24".into()),
            Some("192.168.1.1".into()),
            Some("8.8.8.8".into()),
            Some("  ".into()),
            Some("10.0.0.10/24".into()),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::MissingParameters));
    }

    #[test]
    fn invalid_values_rejected() {
        let mut bad = plan();
        bad.gateway = "192.168.1".into();
        assert!(matches!(
            bad.validate(),
            Err(NetworkError::InvalidParameter { field: "gateway", .. })
        ));

        let mut bad = plan();
        bad.subnet_mask = "33".into();
        assert!(bad.validate().is_err());

        let mut bad = plan();
        bad.subnet_mask = "255.0.255.0".into();
        assert!(bad.validate().is_err());

        let mut bad = plan();
        bad.secondary_ip = "10.0.0.10/40".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn dotted_mask_becomes_prefix() {
        let mut p = plan();
        p.subnet_mask = "255.255.255.128".into();
        assert_eq!(p.prefix_len().unwrap(), 25);
        p.subnet_mask = "0.0.0.0".into();
        assert_eq!(p.prefix_len().unwrap(), 0);
        p.subnet_mask = "255.255.255.255".into();
        assert_eq!(p.prefix_len().unwrap(), 32);
    }

    #[test]
    fn rendered_document_round_trips_through_summary() {
        let yaml = plan().to_document("enp3s0").unwrap().to_yaml().unwrap();
        assert!(yaml.contains("renderer: networkd"));

        let s = summarize(&parse(&yaml)).unwrap();
        assert_eq!(s.interface_name, "enp3s0");
        assert_eq!(s.primary_ip.as_deref(), Some("192.168.1.10"));
        assert_eq!(s.subnet_mask.as_deref(), Some("24"));
        assert_eq!(s.secondary_ip.as_deref(), Some("10.0.0.10/24"));
        assert_eq!(s.gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(s.dns_secondary.as_deref(), Some("8.8.4.4"));
    }
}
