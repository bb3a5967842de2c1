use crate::handlers;
use crate::middleware::{require_token, track_metrics};
use crate::tls;
use anyhow::Context;
use axum::{
    Router,
    extract::State,
    middleware::from_fn_with_state,
    routing::get,
};
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use tiller_core::config::AdminConfig;
use tiller_observability::MetricsCollector;
use tiller_sync::Registry;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for the Registry API.
pub struct AdminState {
    pub registry: Arc<Registry>,
    pub metrics: Arc<MetricsCollector>,
    /// Required `X-Auth-Token` value; `None` disables authentication.
    pub token: Option<String>,
    /// Where `/metrics` is mounted when metrics are enabled.
    pub metrics_path: String,
}

impl AdminState {
    /// Refresh the stored-services gauge after a write.
    pub fn observe_store(&self) {
        if !self.metrics.is_enabled() {
            return;
        }
        match self.registry.services() {
            Ok(services) => self.metrics.set_services(services.len()),
            Err(e) => warn!(error = %e, "Could not count stored services"),
        }
    }
}

/// Build the axum router with every Registry API route.
pub fn build_admin_router(state: Arc<AdminState>) -> Router {
    let mut api = Router::new()
        // Services
        .route(
            "/services",
            get(handlers::services::list_services).post(handlers::services::replace_services),
        )
        .route(
            "/services/{proto}/{ip}/{port}",
            get(handlers::services::get_service)
                .post(handlers::services::put_service)
                .delete(handlers::services::delete_service),
        )
        // Servers
        .route(
            "/services/{proto}/{ip}/{port}/servers",
            get(handlers::servers::list_servers).post(handlers::servers::replace_servers),
        )
        .route(
            "/services/{proto}/{ip}/{port}/servers/{sip}/{sport}",
            get(handlers::servers::get_server)
                .post(handlers::servers::put_server)
                .delete(handlers::servers::delete_server),
        )
        // Reconciliation
        .route("/sync", get(handlers::sync::pull).post(handlers::sync::push));

    if state.metrics.is_enabled() {
        api = api.route(&state.metrics_path, get(metrics_handler));
    }

    let api = api
        .route_layer(from_fn_with_state(Arc::clone(&state), track_metrics))
        .route_layer(from_fn_with_state(Arc::clone(&state), require_token));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler(State(state): State<Arc<AdminState>>) -> String {
    state.metrics.render()
}

/// Serve the Registry API until `handle` is told to shut down.
///
/// HTTPS unless TLS is explicitly disabled in `config`.
pub async fn start_admin(
    config: AdminConfig,
    state: Arc<AdminState>,
    handle: Handle,
) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .addr
        .parse()
        .with_context(|| format!("invalid admin.addr '{}'", config.addr))?;
    let app = build_admin_router(state);

    match tls::rustls_config(&config).await? {
        Some(rustls) => {
            info!(addr = %addr, "Starting Registry API (https)");
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            warn!(addr = %addr, "Admin TLS disabled; starting Registry API over plain http");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    info!("Registry API stopped");
    Ok(())
}
