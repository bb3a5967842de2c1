pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;
use tiller_core::config::{StoreBackend, StoreConfig};
use tiller_core::{Backender, Result};
use tracing::info;

/// Build and initialise the backend selected in `config`.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn Backender>> {
    let store: Arc<dyn Backender> = match config.backend {
        StoreBackend::File => Arc::new(FileStore::new(&config.path)),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    store.init()?;
    info!(backend = store.kind(), path = %config.path.display(), "Store ready");
    Ok(store)
}
