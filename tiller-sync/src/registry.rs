//! Registry coordination over a store and a balancer.
//!
//! Per-service writes take the sync gate shared plus that service's lock;
//! bulk replace, pull and push take the gate exclusively. Reads go straight
//! to the store.

use crate::locks::KeyedLocks;
use crate::reconcile::{self, SyncReport};
use std::sync::Arc;
use tiller_core::server::normalize_servers;
use tiller_core::{Backender, Balancer, Result, Server, Service};
use tokio::sync::RwLock;
use tracing::{debug, info};

pub struct Registry {
    store: Arc<dyn Backender>,
    balancer: Arc<dyn Balancer>,
    gate: RwLock<()>,
    locks: KeyedLocks,
}

impl Registry {
    pub fn new(store: Arc<dyn Backender>, balancer: Arc<dyn Balancer>) -> Self {
        Self {
            store,
            balancer,
            gate: RwLock::new(()),
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Backender> {
        &self.store
    }

    pub fn balancer_name(&self) -> &'static str {
        self.balancer.name()
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn services(&self) -> Result<Vec<Service>> {
        self.store.get_services()
    }

    pub fn service(&self, id: &str) -> Result<Service> {
        self.store.get_service(id)
    }

    pub fn servers(&self, svc_id: &str) -> Result<Vec<Server>> {
        Ok(self.store.get_service(svc_id)?.servers)
    }

    pub fn server(&self, svc_id: &str, srv_id: &str) -> Result<Server> {
        self.store.get_server(svc_id, srv_id)
    }

    // ── Services ───────────────────────────────────────────────

    /// Replace the whole collection. Nothing is written unless every
    /// service validates.
    pub async fn replace_services(&self, services: Vec<Service>) -> Result<()> {
        let mut prepared: Vec<Service> = Vec::with_capacity(services.len());
        for mut svc in services {
            svc.normalize();
            svc.validate()?;
            match prepared.iter_mut().find(|s| s.id == svc.id) {
                Some(existing) => *existing = svc,
                None => prepared.push(svc),
            }
        }

        let _gate = self.gate.write().await;
        self.store.set_services(&prepared)?;
        info!(count = prepared.len(), "Service collection replaced");
        Ok(())
    }

    pub async fn put_service(&self, mut service: Service) -> Result<Service> {
        service.normalize();
        service.validate()?;

        let _gate = self.gate.read().await;
        let _lock = self.locks.lock(&service.id).await;
        self.store.set_service(&service)?;
        debug!(id = %service.id, servers = service.servers.len(), "Service stored");
        Ok(service)
    }

    pub async fn delete_service(&self, id: &str) -> Result<()> {
        let _gate = self.gate.read().await;
        let _lock = self.locks.lock(id).await;
        self.store.delete_service(id)?;
        debug!(id, "Service deleted");
        Ok(())
    }

    // ── Servers ────────────────────────────────────────────────

    pub async fn replace_servers(&self, svc_id: &str, servers: Vec<Server>) -> Result<()> {
        let servers = normalize_servers(svc_id, servers);
        for server in &servers {
            server.validate()?;
        }

        let _gate = self.gate.read().await;
        let _lock = self.locks.lock(svc_id).await;
        self.store.set_servers(svc_id, &servers)?;
        debug!(service = svc_id, count = servers.len(), "Server list replaced");
        Ok(())
    }

    pub async fn put_server(&self, svc_id: &str, mut server: Server) -> Result<Server> {
        server.gen_host(svc_id);
        server.gen_id();
        server.validate()?;

        let _gate = self.gate.read().await;
        let _lock = self.locks.lock(svc_id).await;
        self.store.set_server(svc_id, &server)?;
        debug!(service = svc_id, id = %server.id, "Server stored");
        Ok(server)
    }

    pub async fn delete_server(&self, svc_id: &str, srv_id: &str) -> Result<()> {
        let _gate = self.gate.read().await;
        let _lock = self.locks.lock(svc_id).await;
        self.store.delete_server(svc_id, srv_id)?;
        debug!(service = svc_id, id = srv_id, "Server deleted");
        Ok(())
    }

    // ── Reconciliation ─────────────────────────────────────────

    /// Replace the stored registry with what the balancer is running.
    pub async fn pull(&self) -> Result<SyncReport> {
        let _gate = self.gate.write().await;
        let stored = self.store.get_services()?;
        let adopted = reconcile::adopt_live(self.balancer.as_ref(), &stored).await?;
        self.store.set_services(&adopted)?;

        let report = reconcile::pull_report(&stored, &adopted);
        info!(
            driver = self.balancer.name(),
            applied = report.applied,
            removed = report.removed,
            unchanged = report.unchanged,
            "sync: store replaced from balancer"
        );
        Ok(report)
    }

    /// Program the balancer from the stored registry.
    pub async fn push(&self) -> Result<SyncReport> {
        let _gate = self.gate.write().await;
        let desired = self.store.get_services()?;
        reconcile::program(self.balancer.as_ref(), &desired).await
    }

    /// Number of services with a lock entry held or awaited.
    pub fn locked_services(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryBalancer;
    use tiller_core::{Protocol, TillerError};
    use tiller_store::MemoryStore;

    fn registry() -> Registry {
        Registry::new(Arc::new(MemoryStore::new()), Arc::new(MemoryBalancer::new()))
    }

    #[tokio::test]
    async fn put_service_normalizes_before_storing() {
        let reg = registry();
        let mut svc = Service::new(Protocol::Tcp, "10.0.0.5", 80);
        svc.servers.push(Server::new("127.0.0.1", 9000));
        let stored = reg.put_service(svc).await.unwrap();

        assert_eq!(stored.id, "tcp-10_0_0_5-80");
        assert_eq!(stored.servers[0].host, "10.0.0.5");
        assert_eq!(reg.service("tcp-10_0_0_5-80").unwrap(), stored);
        assert_eq!(reg.locked_services(), 0);
    }

    #[tokio::test]
    async fn invalid_bulk_replace_writes_nothing() {
        let reg = registry();
        reg.put_service(Service::new(Protocol::Tcp, "10.0.0.5", 80))
            .await
            .unwrap();

        let mut bad = Service::new(Protocol::Tcp, "10.0.0.6", 80);
        bad.scheduler = "bogus".into();
        let err = reg
            .replace_services(vec![Service::new(Protocol::Udp, "10.0.0.7", 53), bad])
            .await
            .unwrap_err();
        assert!(matches!(err, TillerError::Validation(_)));
        assert_eq!(reg.services().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn servers_of_missing_service_is_no_service() {
        let reg = registry();
        assert!(matches!(
            reg.servers("tcp-10_0_0_5-80"),
            Err(TillerError::NoService)
        ));
    }

    #[tokio::test]
    async fn put_server_rewrites_loopback() {
        let reg = registry();
        let svc = reg
            .put_service(Service::new(Protocol::Tcp, "10.0.0.5", 80))
            .await
            .unwrap();
        let srv = reg
            .put_server(&svc.id, Server::new("127.0.0.1", 9000))
            .await
            .unwrap();
        assert_eq!(srv.id, "10_0_0_5-9000");
        assert_eq!(reg.server(&svc.id, &srv.id).unwrap().host, "10.0.0.5");
    }
}
