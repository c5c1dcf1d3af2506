use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionStore;
use crate::store::{MemoryStore, Store};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable document store. `PgStore` when DATABASE_URL is set, `MemoryStore` otherwise.
    pub store: Arc<dyn Store>,
    pub sessions: SessionStore,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            sessions: SessionStore::default(),
            config,
        }
    }

    /// In-memory state for local runs and handler tests.
    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }
}
