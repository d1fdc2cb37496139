//! Device and interface records as published by the device fleet

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a network interface on an edge device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceKind {
    Lan,
    Wan,
}

/// A network interface of an edge device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: Uuid,
    pub name: String,
    /// Whether the interface is assigned to the router dataplane
    pub is_assigned: bool,
    #[serde(rename = "type")]
    pub kind: InterfaceKind,
    pub ipv4: String,
    pub ipv4_mask: String,
    /// Address seen from the internet when the interface sits behind NAT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    pub mac: String,
    #[serde(default)]
    pub routing: String,
}

impl Interface {
    /// Only assigned WAN interfaces take part in tunnel meshes
    pub fn is_tunnel_endpoint(&self) -> bool {
        self.is_assigned && self.kind == InterfaceKind::Wan
    }

    /// Address the peer should send tunnel traffic to
    pub fn reachable_address(&self) -> &str {
        match self.public_ip.as_deref() {
            Some(ip) if !ip.is_empty() => ip,
            _ => &self.ipv4,
        }
    }
}

/// Software versions reported by the device agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVersions {
    pub agent: String,
    pub router: String,
}

/// An edge device of an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    pub org: String,
    pub hostname: String,
    /// Identifier the job-delivery system uses to reach the device agent
    pub machine_id: String,
    pub versions: DeviceVersions,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

impl Device {
    /// Interfaces eligible as tunnel endpoints, in declaration order
    pub fn tunnel_interfaces(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter().filter(|i| i.is_tunnel_endpoint())
    }

    pub fn interface(&self, id: Uuid) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interface(kind: InterfaceKind, assigned: bool, public_ip: Option<&str>) -> Interface {
        Interface {
            id: Uuid::new_v4(),
            name: "eth0".to_string(),
            is_assigned: assigned,
            kind,
            ipv4: "192.168.10.2".to_string(),
            ipv4_mask: "24".to_string(),
            public_ip: public_ip.map(str::to_string),
            mac: "52:54:00:12:34:56".to_string(),
            routing: "NONE".to_string(),
        }
    }

    #[test]
    fn test_tunnel_endpoint_filter() {
        assert!(interface(InterfaceKind::Wan, true, None).is_tunnel_endpoint());
        assert!(!interface(InterfaceKind::Wan, false, None).is_tunnel_endpoint());
        assert!(!interface(InterfaceKind::Lan, true, None).is_tunnel_endpoint());
    }

    #[test]
    fn test_reachable_address_prefers_public_ip() {
        let natted = interface(InterfaceKind::Wan, true, Some("203.0.113.7"));
        assert_eq!(natted.reachable_address(), "203.0.113.7");

        let direct = interface(InterfaceKind::Wan, true, None);
        assert_eq!(direct.reachable_address(), "192.168.10.2");

        let blank = interface(InterfaceKind::Wan, true, Some(""));
        assert_eq!(blank.reachable_address(), "192.168.10.2");
    }

    #[test]
    fn test_interface_json_shape() {
        let iface = interface(InterfaceKind::Wan, true, None);
        let value = serde_json::to_value(&iface).unwrap();
        assert_eq!(value["type"], "WAN");
        assert!(value.get("public_ip").is_none());
    }
}
