//! In-process balancer used for tests and dry runs.
//!
//! It keeps services the way a kernel table would: the service interface
//! and the ids are forgotten, and an unset scheduler or forwarder reads back
//! as the kernel default. Pull has to recover them the same way it does
//! against a real IPVS table.

use crate::reconcile::{KERNEL_FORWARDER, KERNEL_SCHEDULER, live_key};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tiller_core::{Balancer, Protocol, Result, Service, TillerError};
use tracing::debug;

#[derive(Default)]
pub struct MemoryBalancer {
    table: Mutex<BTreeMap<String, Service>>,
    failing: Mutex<HashSet<String>>,
    ops: AtomicUsize,
}

impl MemoryBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with services already programmed, as if put there by hand.
    pub fn with_services(services: Vec<Service>) -> Self {
        let balancer = Self::new();
        {
            let mut table = balancer.table.lock().unwrap_or_else(PoisonError::into_inner);
            for svc in services {
                table.insert(live_key(&svc), as_kernel_record(svc));
            }
        }
        balancer
    }

    /// Current table contents in key order.
    pub fn snapshot(&self) -> Vec<Service> {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Number of `apply` and `remove` calls that reached the table.
    pub fn op_count(&self) -> usize {
        self.ops.load(Ordering::Relaxed)
    }

    /// Make every later `apply` or `remove` of service `id` fail.
    pub fn fail_on(&self, id: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    fn check_failure(&self, service: &Service) -> Result<()> {
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(&service.derive_id()) {
            return Err(TillerError::Balancer(format!(
                "injected failure for {}",
                service.derive_id()
            )));
        }
        Ok(())
    }
}

fn as_kernel_record(mut service: Service) -> Service {
    service.id.clear();
    service.interface.clear();
    if service.kind == Protocol::Fwmark {
        service.host = "0.0.0.0".to_string();
    }
    if service.scheduler.is_empty() {
        service.scheduler = KERNEL_SCHEDULER.to_string();
    }
    for server in &mut service.servers {
        server.id.clear();
        if server.forwarder.is_empty() {
            server.forwarder = KERNEL_FORWARDER.to_string();
        }
    }
    service
}

#[async_trait]
impl Balancer for MemoryBalancer {
    async fn services(&self) -> Result<Vec<Service>> {
        Ok(self.snapshot())
    }

    async fn apply(&self, service: &Service) -> Result<()> {
        self.check_failure(service)?;
        self.ops.fetch_add(1, Ordering::Relaxed);
        debug!(id = %service.derive_id(), "memory balancer: apply");
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(live_key(service), as_kernel_record(service.clone()));
        Ok(())
    }

    async fn remove(&self, service: &Service) -> Result<()> {
        self.check_failure(service)?;
        self.ops.fetch_add(1, Ordering::Relaxed);
        debug!(id = %service.derive_id(), "memory balancer: remove");
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&live_key(service))
            .map(|_| ())
            .ok_or_else(|| {
                TillerError::Balancer(format!("{} is not programmed", service.derive_id()))
            })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
