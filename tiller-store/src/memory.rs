//! In-memory backend.
//!
//! Readers load an immutable snapshot through `ArcSwap` and never block.
//! Writers are serialized by a mutex, clone the snapshot, mutate the copy
//! and publish it in one store, so a reader sees either the old or the new
//! collection and never a partial update.

use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tiller_core::{
    Backender, CertBundle, Proxyable, Result, Route, Server, Service, TillerError, Vip, Vipable,
};

pub struct MemoryStore {
    writer: Mutex<()>,
    services: ArcSwap<BTreeMap<String, Service>>,
    routes: ArcSwap<Vec<Route>>,
    certs: ArcSwap<Vec<CertBundle>>,
    vips: ArcSwap<Vec<Vip>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(()),
            services: ArcSwap::from_pointee(BTreeMap::new()),
            routes: ArcSwap::from_pointee(Vec::new()),
            certs: ArcSwap::from_pointee(Vec::new()),
            vips: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Copy-on-write update of one slot. Nothing is published when `f` fails.
    fn mutate<V: Clone, T>(
        &self,
        slot: &ArcSwap<V>,
        f: impl FnOnce(&mut V) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (**slot.load()).clone();
        let out = f(&mut next)?;
        slot.store(Arc::new(next));
        Ok(out)
    }

    fn with_service<T>(&self, id: &str, f: impl FnOnce(&mut Service) -> Result<T>) -> Result<T> {
        self.mutate(&self.services, |map| {
            let service = map.get_mut(id).ok_or(TillerError::NoService)?;
            f(service)
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Backender for MemoryStore {
    fn init(&self) -> Result<()> {
        Ok(())
    }

    fn get_services(&self) -> Result<Vec<Service>> {
        Ok(self.services.load().values().cloned().collect())
    }

    fn get_service(&self, id: &str) -> Result<Service> {
        self.services
            .load()
            .get(id)
            .cloned()
            .ok_or(TillerError::NoService)
    }

    fn set_services(&self, services: &[Service]) -> Result<()> {
        self.mutate(&self.services, |map| {
            *map = services
                .iter()
                .map(|s| (s.id.clone(), s.clone()))
                .collect();
            Ok(())
        })
    }

    fn set_service(&self, service: &Service) -> Result<()> {
        self.mutate(&self.services, |map| {
            map.insert(service.id.clone(), service.clone());
            Ok(())
        })
    }

    fn delete_service(&self, id: &str) -> Result<()> {
        self.mutate(&self.services, |map| {
            map.remove(id).map(|_| ()).ok_or(TillerError::NoService)
        })
    }

    fn set_servers(&self, svc_id: &str, servers: &[Server]) -> Result<()> {
        self.with_service(svc_id, |svc| {
            svc.servers = servers.to_vec();
            Ok(())
        })
    }

    fn set_server(&self, svc_id: &str, server: &Server) -> Result<()> {
        self.with_service(svc_id, |svc| {
            svc.upsert_server(server.clone());
            Ok(())
        })
    }

    fn delete_server(&self, svc_id: &str, srv_id: &str) -> Result<()> {
        self.with_service(svc_id, |svc| {
            if svc.remove_server(srv_id) {
                Ok(())
            } else {
                Err(TillerError::NoServer)
            }
        })
    }

    fn get_server(&self, svc_id: &str, srv_id: &str) -> Result<Server> {
        let snapshot = self.services.load();
        let service = snapshot.get(svc_id).ok_or(TillerError::NoService)?;
        service.server(srv_id).cloned().ok_or(TillerError::NoServer)
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Insert `item`, replacing any entry that shares its key.
fn upsert_by<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T, &T) -> bool) {
    match items.iter_mut().find(|existing| same(existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

fn remove_by<T>(items: &mut Vec<T>, what: &str, pred: impl Fn(&T) -> bool) -> Result<()> {
    let before = items.len();
    items.retain(|i| !pred(i));
    if items.len() == before {
        return Err(TillerError::NotFound(what.to_string()));
    }
    Ok(())
}

fn dedup_by<T>(items: Vec<T>, same: impl Fn(&T, &T) -> bool) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        upsert_by(&mut out, item, &same);
    }
    out
}

impl Proxyable for MemoryStore {
    fn set_route(&self, route: Route) -> Result<()> {
        route.validate()?;
        self.mutate(&self.routes, |routes| {
            upsert_by(routes, route, Route::same_key);
            Ok(())
        })
    }

    fn set_routes(&self, routes: Vec<Route>) -> Result<()> {
        for route in &routes {
            route.validate()?;
        }
        self.mutate(&self.routes, |current| {
            *current = dedup_by(routes, Route::same_key);
            Ok(())
        })
    }

    fn delete_route(&self, route: &Route) -> Result<()> {
        self.mutate(&self.routes, |routes| {
            remove_by(routes, "route", |r| r.same_key(route))
        })
    }

    fn get_routes(&self) -> Result<Vec<Route>> {
        Ok(self.routes.load().to_vec())
    }

    fn set_certs(&self, certs: Vec<CertBundle>) -> Result<()> {
        for cert in &certs {
            cert.validate()?;
        }
        self.mutate(&self.certs, |current| {
            *current = dedup_by(certs, CertBundle::same_key);
            Ok(())
        })
    }

    fn set_cert(&self, cert: CertBundle) -> Result<()> {
        cert.validate()?;
        self.mutate(&self.certs, |certs| {
            upsert_by(certs, cert, CertBundle::same_key);
            Ok(())
        })
    }

    fn delete_cert(&self, cert: &CertBundle) -> Result<()> {
        self.mutate(&self.certs, |certs| {
            remove_by(certs, "cert", |c| c.same_key(cert))
        })
    }

    fn get_certs(&self) -> Result<Vec<CertBundle>> {
        Ok(self.certs.load().to_vec())
    }
}

impl Vipable for MemoryStore {
    fn set_vip(&self, vip: Vip) -> Result<()> {
        vip.validate()?;
        self.mutate(&self.vips, |vips| {
            upsert_by(vips, vip, Vip::same_key);
            Ok(())
        })
    }

    fn set_vips(&self, vips: Vec<Vip>) -> Result<()> {
        for vip in &vips {
            vip.validate()?;
        }
        self.mutate(&self.vips, |current| {
            *current = dedup_by(vips, Vip::same_key);
            Ok(())
        })
    }

    fn delete_vip(&self, vip: &Vip) -> Result<()> {
        self.mutate(&self.vips, |vips| remove_by(vips, "vip", |v| v.same_key(vip)))
    }

    fn get_vips(&self) -> Result<Vec<Vip>> {
        Ok(self.vips.load().to_vec())
    }
}
