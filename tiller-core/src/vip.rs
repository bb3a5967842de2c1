use crate::error::{Result, TillerError};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Virtual IP alias bound to an interface. Keyed by `(ip, interface)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vip {
    /// Address or CIDR, e.g. `192.168.0.100/24`.
    pub ip: String,

    pub interface: String,

    /// Interface alias label, e.g. `eth0:1`.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub alias: String,
}

impl Vip {
    pub fn same_key(&self, other: &Vip) -> bool {
        self.ip == other.ip && self.interface == other.interface
    }

    pub fn validate(&self) -> Result<()> {
        let ok = self.ip.parse::<ipnet::IpNet>().is_ok() || self.ip.parse::<IpAddr>().is_ok();
        if !ok {
            return Err(TillerError::validation(format!("invalid vip '{}'", self.ip)));
        }
        if self.interface.is_empty() {
            return Err(TillerError::validation("vip needs an interface"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vip(ip: &str) -> Vip {
        Vip { ip: ip.into(), interface: "eth0".into(), alias: String::new() }
    }

    #[test]
    fn accepts_address_and_cidr() {
        assert!(vip("192.168.0.100").validate().is_ok());
        assert!(vip("192.168.0.100/24").validate().is_ok());
        assert!(vip("fd00::1/64").validate().is_ok());
        assert!(vip("192.168.0.300").validate().is_err());
    }

    #[test]
    fn key_is_ip_and_interface() {
        let mut other = vip("192.168.0.100");
        other.alias = "eth0:1".into();
        assert!(vip("192.168.0.100").same_key(&other));
        other.interface = "eth1".into();
        assert!(!vip("192.168.0.100").same_key(&other));
    }
}
