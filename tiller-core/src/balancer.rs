use crate::error::Result;
use crate::service::Service;
use async_trait::async_trait;

/// Driver for the live load-balancing engine.
///
/// This is the only boundary between the registry and the kernel; the
/// reconciler is its only caller.
#[async_trait]
pub trait Balancer: Send + Sync {
    /// Virtual services currently programmed, with their pool members.
    async fn services(&self) -> Result<Vec<Service>>;

    /// Make the live virtual service and its pool match `service` exactly,
    /// creating it if needed.
    async fn apply(&self, service: &Service) -> Result<()>;

    /// Remove the virtual service and all of its members.
    async fn remove(&self, service: &Service) -> Result<()>;

    fn name(&self) -> &'static str;
}
