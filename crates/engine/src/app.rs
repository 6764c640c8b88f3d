//! Application state and composition.

use std::sync::Arc;

use crate::engine::deliberation::EngineConfig;
use crate::engine::runner::MatchService;
use crate::infrastructure::hub::MatchHub;
use crate::infrastructure::ports::{ClockPort, MatchStore, ProviderPort};

/// Main application state, passed to HTTP handlers via Axum state.
pub struct App {
    pub store: Arc<dyn MatchStore>,
    pub hub: Arc<MatchHub>,
    pub matches: Arc<MatchService>,
}

impl App {
    /// Wire up all dependencies.
    pub fn new(
        store: Arc<dyn MatchStore>,
        hub: Arc<MatchHub>,
        provider: Arc<dyn ProviderPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let matches = Arc::new(MatchService::new(
            store.clone(),
            hub.clone(),
            provider,
            clock,
            EngineConfig::default(),
        ));
        Self {
            store,
            hub,
            matches,
        }
    }
}
