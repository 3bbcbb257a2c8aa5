/**
 * Application State
 * 
 * `AppState` holds the handles the operational routes need. Each field is an
 * `Arc` so the state clones cheaply per request, and `FromRef` lets handlers
 * extract only the part they use.
 */

use axum::extract::FromRef;
use std::sync::Arc;

use crate::backend::cache::{CacheClient, QueueDrainer};
use crate::backend::replication::ReplicationSync;
use crate::shared::AppConfig;

#[derive(Clone)]
pub struct AppState {
    /// Chat cache shared with socket and route handlers
    pub cache: Arc<CacheClient>,

    /// Backup mirror access
    pub replication: Arc<ReplicationSync>,

    /// Present only when a primary store is configured
    pub drainer: Option<Arc<QueueDrainer>>,

    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        cache: Arc<CacheClient>,
        replication: Arc<ReplicationSync>,
        drainer: Option<Arc<QueueDrainer>>,
        config: AppConfig,
    ) -> Self {
        Self {
            cache,
            replication,
            drainer,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Arc<CacheClient> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.cache.clone()
    }
}

impl FromRef<AppState> for Arc<ReplicationSync> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.replication.clone()
    }
}
