use std::sync::Arc;

use folio_pipeline::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Database pool; `None` when running on in-memory stores.
    pub pool: Option<folio_db::DbPool>,
    pub config: Arc<ServerConfig>,
    /// Dispatcher, monitor and the per-project coordinators and guards.
    pub orchestrator: Arc<Orchestrator>,
}
