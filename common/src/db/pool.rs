// PostgreSQL connection pool for the entity storage tables

use crate::config::DatabaseConfig;
use crate::errors::DatabaseError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Shared PostgreSQL pool; one per process, cloned into every entity storage
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// # Errors
    /// Returns `DatabaseError::ConnectionFailed` if unable to establish connection
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to the entity database");
                DatabaseError::ConnectionFailed(e.to_string())
            })?;

        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Entity database pool ready"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled scheduler schema
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Scheduler schema migrations applied");
        Ok(())
    }

    /// Confirm the scheduler tables are reachable; returns the number of known bundles
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<i64, DatabaseError> {
        let bundles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scheduler_bundles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Scheduler schema check failed");
                DatabaseError::HealthCheckFailed(e.to_string())
            })?;

        debug!(bundles, "Scheduler schema check passed");
        Ok(bundles)
    }
}
