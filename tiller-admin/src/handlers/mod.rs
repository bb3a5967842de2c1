//! Request decoding shared by the handlers.
//!
//! Path segments are parsed here rather than by typed extractors so a bad
//! port or protocol ends up in the flat error envelope.

pub mod health;
pub mod servers;
pub mod services;
pub mod sync;

use axum::body::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tiller_core::{Protocol, Result, Server, Service, TillerError};

fn parse_port(raw: &str, what: &str) -> Result<u16> {
    raw.parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| TillerError::validation(format!("invalid {what} port '{raw}'")))
}

pub(crate) fn service_from_path(proto: &str, host: &str, port: &str) -> Result<Service> {
    let kind = proto.parse::<Protocol>()?;
    let mut service = Service::new(kind, host, parse_port(port, "service")?);
    service.gen_id();
    Ok(service)
}

/// Server named by the path, with its host already resolved against the
/// owning service.
pub(crate) fn server_from_path(svc_id: &str, host: &str, port: &str) -> Result<Server> {
    let mut server = Server::new(host, parse_port(port, "server")?);
    server.gen_host(svc_id);
    server.gen_id();
    Ok(server)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|_| TillerError::bad_body())
}

/// Decode `body` on top of `base`: keys present in the body replace the
/// path-derived ones, everything else is kept. An empty body is no overlay,
/// and a key set to `null` counts as absent.
pub(crate) fn overlay<T: Serialize + DeserializeOwned>(base: T, body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(base);
    }
    let patch = match decode::<Value>(body)? {
        Value::Object(map) => map,
        Value::Null => return Ok(base),
        _ => return Err(TillerError::bad_body()),
    };
    let mut merged = serde_json::to_value(base)?;
    if let Value::Object(ref mut fields) = merged {
        fields.extend(patch.into_iter().filter(|(_, v)| !v.is_null()));
    }
    serde_json::from_value(merged).map_err(|_| TillerError::bad_body())
}
