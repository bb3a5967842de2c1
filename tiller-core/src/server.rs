use crate::error::{Result, TillerError};
use crate::service::{parse_service_id, validate_host};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Forwarding methods understood by IPVS: gatewaying (direct route),
/// ipip tunnel and masquerading (NAT).
pub const FORWARDERS: &[&str] = &["g", "i", "m"];

/// Real server — one member of a virtual service's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    #[serde(
        default,
        deserialize_with = "crate::service::nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,

    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub host: String,

    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub port: u16,

    /// Forwarding method (`g`, `i` or `m`). Empty means the balancer default.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub forwarder: String,

    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub weight: u32,

    /// Connection ceiling; 0 means unbounded.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub upper_threshold: u32,

    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub lower_threshold: u32,
}

impl Server {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            id: String::new(),
            host: host.into(),
            port,
            forwarder: String::new(),
            weight: 0,
            upper_threshold: 0,
            lower_threshold: 0,
        }
    }

    /// Derived id: `{host with '.' → '_'}-{port}`.
    pub fn derive_id(&self) -> String {
        server_id(&self.host, self.port)
    }

    pub fn gen_id(&mut self) {
        self.id = self.derive_id();
    }

    /// Rewrite a loopback host to the host of the owning service.
    ///
    /// The service host is recovered from `svc_id`; ids that do not split
    /// into three parts leave the server untouched.
    pub fn gen_host(&mut self, svc_id: &str) {
        let loopback = self
            .host
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback());
        if !loopback {
            return;
        }
        if let Some((_, host, _)) = parse_service_id(svc_id) {
            self.host = host;
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_host(&self.host, "server")?;
        if self.port == 0 {
            return Err(TillerError::validation("invalid server port (expected 1-65535)"));
        }
        if !self.forwarder.is_empty() && !FORWARDERS.contains(&self.forwarder.as_str()) {
            return Err(TillerError::validation(format!(
                "invalid forwarder '{}' (expected g, i or m)",
                self.forwarder
            )));
        }
        if self.upper_threshold != 0 && self.upper_threshold < self.lower_threshold {
            return Err(TillerError::validation(
                "upper_threshold must not be below lower_threshold",
            ));
        }
        Ok(())
    }
}

pub fn server_id(host: &str, port: u16) -> String {
    format!("{}-{}", host.replace('.', "_"), port)
}

/// Normalize a server list owned by `svc_id`: rewrite loopback hosts,
/// derive ids and collapse duplicates (last wins, first position kept).
pub fn normalize_servers(svc_id: &str, servers: Vec<Server>) -> Vec<Server> {
    let mut out: Vec<Server> = Vec::with_capacity(servers.len());
    for mut server in servers {
        server.gen_host(svc_id);
        server.gen_id();
        match out.iter_mut().find(|s| s.id == server.id) {
            Some(existing) => *existing = server,
            None => out.push(server),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_joins_host_and_port() {
        assert_eq!(Server::new("10.0.0.7", 8080).derive_id(), "10_0_0_7-8080");
    }

    #[test]
    fn loopback_host_takes_service_host() {
        let mut s = Server::new("127.0.0.1", 9000);
        s.gen_host("tcp-10_0_0_5-80");
        assert_eq!(s.host, "10.0.0.5");
        assert_eq!(s.port, 9000);
    }

    #[test]
    fn non_loopback_host_is_kept() {
        let mut s = Server::new("10.0.0.9", 9000);
        s.gen_host("tcp-10_0_0_5-80");
        assert_eq!(s.host, "10.0.0.9");
    }

    #[test]
    fn malformed_service_id_skips_rewrite() {
        let mut s = Server::new("127.0.0.1", 9000);
        s.gen_host("tcp-10_0_0_5");
        assert_eq!(s.host, "127.0.0.1");
    }

    #[test]
    fn gen_host_is_idempotent() {
        let mut s = Server::new("127.0.0.1", 9000);
        s.gen_host("tcp-10_0_0_5-80");
        s.gen_host("tcp-10_0_0_5-80");
        assert_eq!(s.host, "10.0.0.5");
    }

    #[test]
    fn validate_checks_forwarder_and_thresholds() {
        let mut s = Server::new("10.0.0.7", 8080);
        assert!(s.validate().is_ok());

        s.forwarder = "x".into();
        assert!(s.validate().is_err());

        s.forwarder = "m".into();
        s.upper_threshold = 10;
        s.lower_threshold = 20;
        assert!(s.validate().is_err());

        s.upper_threshold = 0;
        assert!(s.validate().is_ok(), "zero upper threshold means unbounded");
    }

    #[test]
    fn server_json_field_names() {
        let s: Server = serde_json::from_str(
            r#"{"host":"10.0.0.7","port":8080,"forwarder":"g","weight":5,"upper_threshold":100,"lower_threshold":10}"#,
        )
        .unwrap();
        assert_eq!(s.weight, 5);
        assert_eq!(s.upper_threshold, 100);
        assert_eq!(s.lower_threshold, 10);
    }
}
