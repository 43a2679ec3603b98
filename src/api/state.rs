use std::sync::Arc;

use crate::repository::CatalogRepository;
use crate::services::redemption::RedemptionEngine;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn CatalogRepository>,
    pub engine: Arc<RedemptionEngine>,
}

impl AppState {
    /// Builds the state around one storage backend shared by the catalog and the engine
    pub fn new<S>(storage: Arc<S>) -> Self
    where
        S: CatalogRepository + 'static,
    {
        let engine = RedemptionEngine::new(storage.clone());
        Self {
            storage,
            engine: Arc::new(engine),
        }
    }
}
