//! Load-balancer drivers.

pub mod ipvsadm;
pub mod memory;

pub use ipvsadm::IpvsadmBalancer;
pub use memory::MemoryBalancer;

use std::sync::Arc;
use tiller_core::Balancer;
use tiller_core::config::{BalancerConfig, BalancerDriver};
use tracing::info;

/// Build the driver selected in `config`.
pub fn from_config(config: &BalancerConfig) -> Arc<dyn Balancer> {
    let balancer: Arc<dyn Balancer> = match config.driver {
        BalancerDriver::Ipvsadm => Arc::new(IpvsadmBalancer::new(&config.ipvsadm_path)),
        BalancerDriver::Memory => Arc::new(MemoryBalancer::new()),
    };
    info!(driver = balancer.name(), "Balancer driver selected");
    balancer
}
