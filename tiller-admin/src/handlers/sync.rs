use crate::response::{ApiResult, ok};
use crate::server::AdminState;
use axum::extract::State;
use std::sync::Arc;

/// GET /sync: adopt the live balancer state into the store.
pub async fn pull(State(state): State<Arc<AdminState>>) -> ApiResult {
    let result = state.registry.pull().await;
    state.metrics.record_sync("pull", result.is_ok());
    let report = result?;
    state.observe_store();
    ok(&report)
}

/// POST /sync: program the balancer from the store.
pub async fn push(State(state): State<Arc<AdminState>>) -> ApiResult {
    let result = state.registry.push().await;
    state.metrics.record_sync("push", result.is_ok());
    ok(&result?)
}
