/**
 * Server Initialization
 * 
 * `create_app` is the composition root: it builds the cache, the replication
 * engine and the optional primary-store pieces from one `AppConfig`, starts
 * the background tasks, and returns the router together with everything the
 * binary needs for an orderly shutdown.
 * 
 * # Background Tasks
 * 
 * - `BackupScheduler` - only when both the mirror and the primary store are configured
 * - `QueueDrainer` - only when the primary store is configured
 * 
 * # Shutdown
 * 
 * `App::shutdown` stops the drain loop cooperatively, so a batch being
 * persisted is never dropped, then flushes the queue and closes every store.
 */

use axum::Router;
use std::sync::Arc;

use crate::backend::cache::{CacheClient, DrainHandle, MessageSink, PgMessageSink, QueueDrainer};
use crate::backend::replication::{BackupHandle, BackupScheduler, PgSource, PrimarySource, ReplicationSync};
use crate::backend::routes::router::create_router;
use crate::backend::server::config::load_database;
use crate::backend::server::state::AppState;
use crate::shared::AppConfig;

/// A configured application and its background tasks
pub struct App {
    pub router: Router<()>,
    pub state: AppState,
    backup: Option<BackupHandle>,
    drain_task: Option<DrainHandle>,
}

impl App {
    /// Stop background tasks, flush the write-behind queue and close every
    /// connection.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down background tasks");

        if let Some(backup) = &self.backup {
            backup.abort();
        }
        // a cycle in progress still owns its batch, so wait for it
        if let Some(task) = self.drain_task {
            task.stop().await;
        }

        if let Some(drainer) = &self.state.drainer {
            match drainer.drain_once().await {
                Ok(written) => tracing::info!("[Drain] Final flush persisted {} messages", written),
                Err(e) => tracing::error!("[Drain] Final flush failed: {}", e),
            }
        } else {
            let dropped = self.state.cache.get_message_queue().await.len();
            if dropped > 0 {
                tracing::warn!("[Drain] No primary store; {} queued messages discarded", dropped);
            }
        }

        self.state.cache.close().await;
        self.state.replication.close().await;
    }
}

/// Create and configure the application from `config`.
///
/// # Error Handling
///
/// Every external store is optional. Missing or unreachable stores are logged
/// and the matching feature degrades; this function itself never fails.
pub async fn create_app(config: AppConfig) -> App {
    tracing::info!("Initializing StudySync backend server");

    let cache = Arc::new(CacheClient::init(&config).await);

    let db_pool = load_database(&config).await;
    let source: Option<Arc<dyn PrimarySource>> = db_pool
        .clone()
        .map(|pool| Arc::new(PgSource::new(pool)) as Arc<dyn PrimarySource>);
    let sink: Option<Arc<dyn MessageSink>> =
        db_pool.map(|pool| Arc::new(PgMessageSink::new(pool)) as Arc<dyn MessageSink>);

    let replication = Arc::new(ReplicationSync::init(&config, source).await);
    let drainer = sink.map(|sink| Arc::new(QueueDrainer::new(Arc::clone(&cache), sink)));

    let backup = if replication.is_configured().await && replication.has_source() {
        let scheduler = BackupScheduler::new(Arc::clone(&replication), config.backup_startup_delay());
        Some(scheduler.schedule(config.backup_interval()))
    } else {
        tracing::info!("[Backup] Scheduled backups disabled");
        None
    };

    let drain_task = drainer
        .as_ref()
        .map(|drainer| QueueDrainer::spawn(Arc::clone(drainer), config.drain_interval()));

    let state = AppState::new(cache, replication, drainer, config);
    let router = create_router(state.clone());

    tracing::info!("Router configured");

    App {
        router,
        state,
        backup,
        drain_task,
    }
}
