use std::sync::Arc;

use crate::services::{cache::StatusCache, orchestrator::Orchestrator, storage::AssetStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub storage: Arc<dyn AssetStore>,
    pub cache: Option<Arc<dyn StatusCache>>,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        storage: Arc<dyn AssetStore>,
        cache: Option<Arc<dyn StatusCache>>,
    ) -> Self {
        Self {
            orchestrator,
            storage,
            cache,
        }
    }
}
