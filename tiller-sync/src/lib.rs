pub mod driver;
pub mod locks;
pub mod reconcile;
pub mod registry;

pub use reconcile::{SyncDirection, SyncReport};
pub use registry::Registry;
