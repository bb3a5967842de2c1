use crate::error::{Result, TillerError};
use crate::server::{Server, normalize_servers};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// IPVS schedulers accepted for a virtual service.
pub const SCHEDULERS: &[&str] = &[
    "rr", "wrr", "lc", "wlc", "lblc", "lblcr", "dh", "sh", "sed", "nq", "fo", "ovf", "mh",
];

/// Virtual service protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    /// Firewall-mark service; the mark value travels in `port`.
    Fwmark,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Fwmark => "fwmark",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = TillerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            "fwmark" => Ok(Protocol::Fwmark),
            other => Err(TillerError::validation(format!(
                "invalid service type '{other}' (expected tcp, udp or fwmark)"
            ))),
        }
    }
}

/// Virtual server definition.
///
/// Identity is `(type, host, port)`; `id` is derived from it by
/// [`Service::gen_id`] and is what the store keys records by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,

    #[serde(default, deserialize_with = "nullable")]
    pub host: String,

    /// Interface the service address lives on (optional).
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "String::is_empty"
    )]
    pub interface: String,

    #[serde(default, deserialize_with = "nullable")]
    pub port: u16,

    #[serde(rename = "type")]
    pub kind: Protocol,

    /// Scheduler name, e.g. `wrr`. Empty lets the balancer pick its default.
    #[serde(default, deserialize_with = "nullable")]
    pub scheduler: String,

    /// Session affinity timeout in seconds; 0 disables it.
    #[serde(default, deserialize_with = "nullable")]
    pub persistence: u32,

    #[serde(default, deserialize_with = "nullable")]
    pub netmask: String,

    #[serde(default, deserialize_with = "nullable")]
    pub servers: Vec<Server>,
}

impl Service {
    pub fn new(kind: Protocol, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: String::new(),
            host: host.into(),
            interface: String::new(),
            port,
            kind,
            scheduler: String::new(),
            persistence: 0,
            netmask: String::new(),
            servers: Vec::new(),
        }
    }

    /// Derived id: `{type}-{host with '.' → '_'}-{port}`.
    pub fn derive_id(&self) -> String {
        service_id(self.kind, &self.host, self.port)
    }

    pub fn gen_id(&mut self) {
        self.id = self.derive_id();
    }

    /// Prepare the service for storage: derive ids, rewrite loopback server
    /// hosts to the service host and collapse duplicate servers.
    pub fn normalize(&mut self) {
        self.gen_id();
        self.servers = normalize_servers(&self.id, std::mem::take(&mut self.servers));
    }

    pub fn validate(&self) -> Result<()> {
        validate_host(&self.host, "service")?;
        if self.port == 0 {
            return Err(TillerError::validation("invalid service port (expected 1-65535)"));
        }
        if !self.scheduler.is_empty() && !SCHEDULERS.contains(&self.scheduler.as_str()) {
            return Err(TillerError::validation(format!(
                "invalid scheduler '{}'",
                self.scheduler
            )));
        }
        if !self.netmask.is_empty() && self.netmask.parse::<IpAddr>().is_err() {
            return Err(TillerError::validation(format!(
                "invalid netmask '{}'",
                self.netmask
            )));
        }
        for server in &self.servers {
            server.validate()?;
        }
        Ok(())
    }

    pub fn server(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// Replace the server with the same id in place, or append it.
    pub fn upsert_server(&mut self, server: Server) {
        match self.servers.iter_mut().find(|s| s.id == server.id) {
            Some(existing) => *existing = server,
            None => self.servers.push(server),
        }
    }

    /// Drop the server with `id`. Returns false when nothing matched.
    pub fn remove_server(&mut self, id: &str) -> bool {
        let before = self.servers.len();
        self.servers.retain(|s| s.id != id);
        self.servers.len() != before
    }
}

/// Build a service id from its identity triple.
pub fn service_id(kind: Protocol, host: &str, port: u16) -> String {
    format!("{}-{}-{}", kind, host.replace('.', "_"), port)
}

/// Split a service id back into `(type, host, port)`.
///
/// Returns `None` unless the id has exactly three `-` separated parts.
pub fn parse_service_id(id: &str) -> Option<(String, String, String)> {
    let restored = id.replace('_', ".");
    let parts: Vec<&str> = restored.split('-').collect();
    match parts.as_slice() {
        [kind, host, port] => Some((kind.to_string(), host.to_string(), port.to_string())),
        _ => None,
    }
}

/// Field deserializer that reads an explicit `null` as the field's default.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn validate_host(host: &str, what: &str) -> Result<()> {
    host.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| TillerError::validation(format!("invalid {what} host '{host}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc() -> Service {
        Service::new(Protocol::Tcp, "10.0.0.5", 80)
    }

    #[test]
    fn id_joins_type_host_and_port() {
        assert_eq!(svc().derive_id(), "tcp-10_0_0_5-80");
    }

    #[test]
    fn gen_id_is_idempotent() {
        let mut s = svc();
        s.gen_id();
        let first = s.id.clone();
        s.gen_id();
        assert_eq!(s.id, first);
    }

    #[test]
    fn parse_service_id_inverts_derivation() {
        let (kind, host, port) = parse_service_id("udp-192_168_1_10-53").unwrap();
        assert_eq!(kind, "udp");
        assert_eq!(host, "192.168.1.10");
        assert_eq!(port, "53");
    }

    #[test]
    fn parse_service_id_rejects_wrong_arity() {
        assert!(parse_service_id("tcp-10_0_0_5").is_none());
        assert!(parse_service_id("a-b-c-d").is_none());
    }

    #[test]
    fn protocol_parses_known_values_only() {
        assert_eq!("fwmark".parse::<Protocol>().unwrap(), Protocol::Fwmark);
        assert!("sctp".parse::<Protocol>().is_err());
    }

    #[test]
    fn minimal_service_deserializes_with_empty_servers() {
        let s: Service =
            serde_json::from_str(r#"{"host":"10.0.0.5","port":80,"type":"tcp"}"#).unwrap();
        assert!(s.servers.is_empty());
        assert_eq!(s.persistence, 0);
        let out = serde_json::to_value(&s).unwrap();
        assert_eq!(out["servers"], serde_json::json!([]));
        assert!(out.get("id").is_none());
        assert!(out.get("interface").is_none());
    }

    #[test]
    fn null_optional_fields_read_as_unset() {
        let s: Service = serde_json::from_str(
            r#"{"host":"10.0.0.5","port":80,"type":"tcp","scheduler":null,
                "netmask":null,"interface":null,"persistence":null,
                "servers":[{"host":"10.0.0.7","port":8080,"forwarder":null,"weight":null}]}"#,
        )
        .unwrap();
        assert!(s.scheduler.is_empty());
        assert!(s.netmask.is_empty());
        assert!(s.interface.is_empty());
        assert_eq!(s.persistence, 0);
        assert!(s.servers[0].forwarder.is_empty());
        assert_eq!(s.servers[0].weight, 0);

        let s: Service =
            serde_json::from_str(r#"{"host":"10.0.0.5","port":80,"type":"tcp","servers":null}"#)
                .unwrap();
        assert!(s.servers.is_empty());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut s = svc();
        s.host = "not-an-ip".into();
        assert!(s.validate().is_err());

        let mut s = svc();
        s.port = 0;
        assert!(s.validate().is_err());

        let mut s = svc();
        s.scheduler = "random".into();
        assert!(s.validate().is_err());

        let mut s = svc();
        s.netmask = "255.255.255".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_accepts_full_service() {
        let mut s = svc();
        s.scheduler = "wrr".into();
        s.netmask = "255.255.255.0".into();
        s.persistence = 300;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn normalize_rewrites_loopback_and_dedups() {
        let mut s = svc();
        s.servers.push(Server::new("127.0.0.1", 9000));
        s.servers.push(Server::new("10.0.0.7", 8080));
        let mut dup = Server::new("10.0.0.5", 9000);
        dup.weight = 7;
        s.servers.push(dup);
        s.normalize();

        assert_eq!(s.id, "tcp-10_0_0_5-80");
        assert_eq!(s.servers.len(), 2);
        assert_eq!(s.servers[0].id, "10_0_0_5-9000");
        assert_eq!(s.servers[0].host, "10.0.0.5");
        assert_eq!(s.servers[0].weight, 7);
        assert_eq!(s.servers[1].id, "10_0_0_7-8080");
    }

    #[test]
    fn remove_server_reports_match() {
        let mut s = svc();
        s.servers.push(Server::new("10.0.0.7", 8080));
        s.normalize();
        assert!(!s.remove_server("10_0_0_8-8080"));
        assert!(s.remove_server("10_0_0_7-8080"));
        assert!(s.servers.is_empty());
    }
}
