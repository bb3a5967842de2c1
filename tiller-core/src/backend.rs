//! Capability traits for the pluggable storage and proxy layers.
//!
//! The admin API and the reconciler depend only on these traits; concrete
//! implementations live in `tiller-store`.

use crate::cert::CertBundle;
use crate::error::Result;
use crate::route::Route;
use crate::server::Server;
use crate::service::Service;
use crate::vip::Vip;

/// Storage for desired service state.
///
/// Servers are embedded in their owning service; every server operation is
/// a read-modify-write of that service's record. Callers are expected to
/// serialize mutations per service id.
pub trait Backender: Send + Sync {
    /// Prepare the storage medium (create directories, open handles).
    fn init(&self) -> Result<()>;

    /// All stored services. An empty or missing collection is an empty list.
    fn get_services(&self) -> Result<Vec<Service>>;

    /// Fails with `NoService` when `id` is not stored.
    fn get_service(&self, id: &str) -> Result<Service>;

    /// Replace the whole collection; services absent from `services` are removed.
    fn set_services(&self, services: &[Service]) -> Result<()>;

    /// Upsert by `service.id`.
    fn set_service(&self, service: &Service) -> Result<()>;

    fn delete_service(&self, id: &str) -> Result<()>;

    /// Replace one service's server list.
    fn set_servers(&self, svc_id: &str, servers: &[Server]) -> Result<()>;

    /// Upsert one server by `server.id` within its service.
    fn set_server(&self, svc_id: &str, server: &Server) -> Result<()>;

    fn delete_server(&self, svc_id: &str, srv_id: &str) -> Result<()>;

    fn get_server(&self, svc_id: &str, srv_id: &str) -> Result<Server>;

    /// Short name for logs and the health endpoint.
    fn kind(&self) -> &'static str;
}

/// L7 routing and certificate storage.
pub trait Proxyable: Send + Sync {
    fn set_route(&self, route: Route) -> Result<()>;
    fn set_routes(&self, routes: Vec<Route>) -> Result<()>;
    fn delete_route(&self, route: &Route) -> Result<()>;
    fn get_routes(&self) -> Result<Vec<Route>>;

    fn set_certs(&self, certs: Vec<CertBundle>) -> Result<()>;
    fn set_cert(&self, cert: CertBundle) -> Result<()>;
    fn delete_cert(&self, cert: &CertBundle) -> Result<()>;
    fn get_certs(&self) -> Result<Vec<CertBundle>>;
}

/// Virtual IP alias storage.
pub trait Vipable: Send + Sync {
    fn set_vip(&self, vip: Vip) -> Result<()>;
    fn set_vips(&self, vips: Vec<Vip>) -> Result<()>;
    fn delete_vip(&self, vip: &Vip) -> Result<()>;
    fn get_vips(&self) -> Result<Vec<Vip>>;
}
