pub mod backend;
pub mod balancer;
pub mod cert;
pub mod config;
pub mod error;
pub mod route;
pub mod server;
pub mod service;
pub mod vip;

pub use backend::{Backender, Proxyable, Vipable};
pub use balancer::Balancer;
pub use cert::CertBundle;
pub use config::TillerConfig;
pub use error::{Result, TillerError};
pub use route::Route;
pub use server::Server;
pub use service::{Protocol, Service};
pub use vip::Vip;
