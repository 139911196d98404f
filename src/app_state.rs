use std::sync::Arc;

use crate::db::store::JobStore;
use crate::services::job_service::JobService;
use crate::services::storage::LocalStorage;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    pub store: Arc<dyn JobStore>,
    /// Set when inputs and outputs live on local disk and are served by token.
    pub assets: Option<Arc<LocalStorage>>,
    pub callback_secret: Arc<str>,
}

impl AppState {
    pub fn new(
        jobs: Arc<JobService>,
        store: Arc<dyn JobStore>,
        assets: Option<Arc<LocalStorage>>,
        callback_secret: &str,
    ) -> Self {
        Self {
            jobs,
            store,
            assets,
            callback_secret: Arc::from(callback_secret),
        }
    }
}
