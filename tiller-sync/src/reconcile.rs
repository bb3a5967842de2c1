//! Full-state reconciliation between the stored registry and the live
//! balancer.
//!
//! * **pull** (`GET /sync`): live state replaces the stored registry.
//! * **push** (`POST /sync`): the balancer is programmed to match the store;
//!   live services missing from the store are removed.
//!
//! Both directions are full replaces and converge: running either twice in a
//! row makes no change the second time.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tiller_core::{Balancer, Protocol, Result, Server, Service, TillerError};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Balancer → store.
    Pull,
    /// Store → balancer.
    Push,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Pull => f.write_str("pull"),
            SyncDirection::Push => f.write_str("push"),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    /// Services written to the target side.
    pub applied: usize,
    /// Services removed from the target side.
    pub removed: usize,
    /// Services already converged.
    pub unchanged: usize,
}

impl SyncReport {
    fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            applied: 0,
            removed: 0,
            unchanged: 0,
        }
    }
}

/// Scheduler IPVS assigns when a service is added without one.
pub const KERNEL_SCHEDULER: &str = "wlc";

/// Forwarding method IPVS assigns when a real server is added without one.
pub const KERNEL_FORWARDER: &str = "g";

/// Key the balancer itself identifies a virtual service by.
///
/// Firewall-mark services carry no address in the kernel, so they are
/// matched on the mark alone.
pub fn live_key(service: &Service) -> String {
    match service.kind {
        Protocol::Fwmark => format!("fwmark-{}", service.port),
        _ => service.derive_id(),
    }
}

/// Fill in attributes the balancer cannot report from the stored record
/// that describes the same virtual service.
///
/// A scheduler or forwarder left empty in the stored record stays empty
/// while the balancer only reports the kernel default for it.
pub fn carry_unobserved(live: &mut Service, stored: &Service) {
    if live.interface.is_empty() {
        live.interface = stored.interface.clone();
    }
    if live.netmask.is_empty() {
        live.netmask = stored.netmask.clone();
    }
    if live.kind == Protocol::Fwmark {
        live.host = stored.host.clone();
    }
    if stored.scheduler.is_empty() && live.scheduler == KERNEL_SCHEDULER {
        live.scheduler.clear();
    }
    for server in &mut live.servers {
        if server.forwarder != KERNEL_FORWARDER {
            continue;
        }
        if let Some(prev) = stored.servers.iter().find(|s| s.id == server.derive_id())
            && prev.forwarder.is_empty()
        {
            server.forwarder.clear();
        }
    }
}

/// True when `live` already carries everything `desired` programs.
///
/// An empty scheduler or forwarder in `desired` accepts whatever default the
/// balancer chose. Pool members are compared as a set keyed by server id.
pub fn converged(desired: &Service, live: &Service) -> bool {
    if live_key(desired) != live_key(live) {
        return false;
    }
    if !desired.scheduler.is_empty() && desired.scheduler != live.scheduler {
        return false;
    }
    if desired.persistence != live.persistence {
        return false;
    }
    if desired.persistence > 0 && !desired.netmask.is_empty() && desired.netmask != live.netmask {
        return false;
    }
    if desired.servers.len() != live.servers.len() {
        return false;
    }
    let live_servers: HashMap<&str, &Server> =
        live.servers.iter().map(|s| (s.id.as_str(), s)).collect();
    desired.servers.iter().all(|want| match live_servers.get(want.id.as_str()) {
        Some(have) => server_converged(want, have),
        None => false,
    })
}

pub(crate) fn server_converged(want: &Server, have: &Server) -> bool {
    (want.forwarder.is_empty() || want.forwarder == have.forwarder)
        && want.weight == have.weight
        && want.upper_threshold == have.upper_threshold
        && want.lower_threshold == have.lower_threshold
}

/// Read the balancer and build the collection that should replace the store.
pub async fn adopt_live(balancer: &dyn Balancer, stored: &[Service]) -> Result<Vec<Service>> {
    let live = balancer.services().await?;
    let mut adopted: Vec<Service> = Vec::with_capacity(live.len());
    for mut svc in live {
        let key = live_key(&svc);
        if let Some(prev) = stored.iter().find(|s| live_key(s) == key) {
            carry_unobserved(&mut svc, prev);
        }
        svc.normalize();
        match adopted.iter_mut().find(|s| s.id == svc.id) {
            Some(existing) => *existing = svc,
            None => adopted.push(svc),
        }
    }
    Ok(adopted)
}

/// Program the balancer to match `desired`.
///
/// Best-effort: every removal and apply is attempted; failures are collected
/// and reported together once the pass is over.
pub async fn program(balancer: &dyn Balancer, desired: &[Service]) -> Result<SyncReport> {
    let mut live = balancer.services().await?;
    for svc in &mut live {
        svc.normalize();
    }

    let mut report = SyncReport::new(SyncDirection::Push);
    let mut failures: Vec<String> = Vec::new();
    let mut attempted = 0usize;

    for stale in live
        .iter()
        .filter(|l| !desired.iter().any(|d| live_key(d) == live_key(l)))
    {
        attempted += 1;
        match balancer.remove(stale).await {
            Ok(()) => report.removed += 1,
            Err(e) => {
                warn!(id = %stale.id, error = %e, "sync: failed to remove live service");
                failures.push(format!("remove {}: {e}", stale.id));
            }
        }
    }

    for want in desired {
        let key = live_key(want);
        if let Some(have) = live.iter().find(|l| live_key(l) == key)
            && converged(want, have)
        {
            report.unchanged += 1;
            continue;
        }
        attempted += 1;
        match balancer.apply(want).await {
            Ok(()) => report.applied += 1,
            Err(e) => {
                warn!(id = %want.id, error = %e, "sync: failed to apply service");
                failures.push(format!("apply {}: {e}", want.id));
            }
        }
    }

    if let Some(first) = failures.first() {
        return Err(TillerError::Balancer(format!(
            "{} of {} sync operations failed; first: {}",
            failures.len(),
            attempted,
            first
        )));
    }

    info!(
        driver = balancer.name(),
        applied = report.applied,
        removed = report.removed,
        unchanged = report.unchanged,
        "sync: balancer programmed from store"
    );
    Ok(report)
}

pub(crate) fn pull_report(stored: &[Service], adopted: &[Service]) -> SyncReport {
    let mut report = SyncReport::new(SyncDirection::Pull);
    for svc in adopted {
        match stored.iter().find(|s| s.id == svc.id) {
            Some(prev) if prev == svc => report.unchanged += 1,
            _ => report.applied += 1,
        }
    }
    report.removed = stored
        .iter()
        .filter(|s| !adopted.iter().any(|a| a.id == s.id))
        .count();
    report
}
