/**
 * Server Configuration
 * 
 * Loading of the optional PostgreSQL primary store. A missing or unreachable
 * database is logged and leaves the pool `None`; the server still starts,
 * without queue draining and without full backups.
 */

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::shared::{AppConfig, ConfigError};

/// Database configuration result
pub type DatabaseConfig = Option<PgPool>;

/// Connect to `config.database_url` if one is set.
///
/// # Returns
///
/// - `Some(PgPool)` if the pool connected
/// - `None` if `DATABASE_URL` is not set or the connection fails
pub async fn load_database(config: &AppConfig) -> DatabaseConfig {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set. Queue draining and full backups will be disabled.");
        return None;
    };

    tracing::info!("Connecting to database...");

    match PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Database connection pool created successfully");
            Some(pool)
        }
        Err(e) => {
            tracing::error!("Failed to create database connection pool: {:?}", e);
            tracing::warn!("Queue draining and full backups will be disabled.");
            None
        }
    }
}

/// Load `AppConfig` from the optional TOML file and the environment.
///
/// Invalid configuration is an error; the binary refuses to start on it.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let config = AppConfig::load()?;
    tracing::info!(
        "Configuration loaded: redis={}, mongo={}, database={}, {} collections",
        config.redis_url.is_some(),
        config.mongo_url.is_some(),
        config.database_url.is_some(),
        config.collections.len()
    );
    Ok(config)
}
