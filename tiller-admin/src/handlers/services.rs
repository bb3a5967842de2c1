use super::{decode, overlay, service_from_path};
use crate::response::{ApiResult, null, ok};
use crate::server::AdminState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use std::sync::Arc;
use tiller_core::Service;

/// GET /services
pub async fn list_services(State(state): State<Arc<AdminState>>) -> ApiResult {
    ok(&state.registry.services()?)
}

/// POST /services
pub async fn replace_services(State(state): State<Arc<AdminState>>, body: Bytes) -> ApiResult {
    let services: Vec<Service> = decode(&body)?;
    state.registry.replace_services(services).await?;
    state.observe_store();
    null()
}

/// GET /services/{proto}/{ip}/{port}
pub async fn get_service(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port)): Path<(String, String, String)>,
) -> ApiResult {
    let svc = service_from_path(&proto, &ip, &port)?;
    ok(&state.registry.service(&svc.id)?)
}

/// POST /services/{proto}/{ip}/{port}
pub async fn put_service(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port)): Path<(String, String, String)>,
    body: Bytes,
) -> ApiResult {
    let service = overlay(service_from_path(&proto, &ip, &port)?, &body)?;
    state.registry.put_service(service).await?;
    state.observe_store();
    null()
}

/// DELETE /services/{proto}/{ip}/{port}
pub async fn delete_service(
    State(state): State<Arc<AdminState>>,
    Path((proto, ip, port)): Path<(String, String, String)>,
) -> ApiResult {
    let svc = service_from_path(&proto, &ip, &port)?;
    state.registry.delete_service(&svc.id).await?;
    state.observe_store();
    null()
}
