use super::{decode, overlay, server_from_path, service_from_path};
use crate::response::{ApiResult, null, ok};
use crate::server::AdminState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use std::sync::Arc;
use tiller_core::Server;

type ServerPath = (String, String, String, String, String);

/// GET /services/{proto}/{ip}/{port}/servers
pub async fn list_servers(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port)): Path<(String, String, String)>,
) -> ApiResult {
    let svc = service_from_path(&proto, &ip, &port)?;
    ok(&state.registry.servers(&svc.id)?)
}

/// POST /services/{proto}/{ip}/{port}/servers
pub async fn replace_servers(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult {
    let svc = service_from_path(&proto, &ip, &port)?;
    let servers: Vec<Server> = decode(&body)?;
    state.registry.replace_servers(&svc.id, servers).await?;
    null()
}

/// GET /services/{proto}/{ip}/{port}/servers/{sip}/{sport}
pub async fn get_server(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port, sip, sport)): Path<ServerPath>,
) -> ApiResult {
    let svc = service_from_path(&proto, &ip, &port)?;
    let srv = server_from_path(&svc.id, &sip, &sport)?;
    ok(&state.registry.server(&svc.id, &srv.id)?)
}

/// POST /services/{proto}/{ip}/{port}/servers/{sip}/{sport}
pub async fn put_server(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port, sip, sport)): Path<ServerPath>,
    body: Bytes,
) -> ApiResult {
    let svc = service_from_path(&proto, &ip, &port)?;
    let server = overlay(server_from_path(&svc.id, &sip, &sport)?, &body)?;
    state.registry.put_server(&svc.id, server).await?;
    null()
}

/// DELETE /services/{proto}/{ip}/{port}/servers/{sip}/{sport}
pub async fn delete_server(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port, sip, sport)): Path<ServerPath>,
) -> ApiResult {
    let svc = service_from_path(&proto, &ip, &port)?;
    let srv = server_from_path(&svc.id, &sip, &sport)?;
    state.registry.delete_server(&svc.id, &srv.id).await?;
    null()
}
