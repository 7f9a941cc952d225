// Bootstrap utilities for binary initialization
// Shared by the scheduler CLI and the API server

use crate::config::Settings;
use crate::cron::LightweightCron;
use crate::db::{DbPool, RedisPool};
use crate::lock::{DistributedLock, LocalLock, RedLock};
use crate::scheduler::{MediaScheduler, NodeScheduler, PluginRegistry, SchedulerManager};
use crate::storage::PostgresStorage;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Initialize database pool and apply migrations
///
/// # Errors
/// Returns error if the pool cannot connect or a migration fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::new(&settings.database)
        .await
        .context("Failed to initialize database pool")?;
    db_pool
        .migrate()
        .await
        .context("Failed to apply database migrations")?;
    let bundles = db_pool
        .health_check()
        .await
        .context("Scheduler tables unreachable")?;

    info!(bundles, "Database pool initialized");
    Ok(db_pool)
}

/// Initialize Redis pool for the run lock
///
/// # Errors
/// Returns error if Redis pool initialization fails
#[tracing::instrument(skip(settings))]
pub async fn init_redis_pool(settings: &Settings) -> Result<RedisPool> {
    info!("Initializing Redis pool");

    let redis_pool = RedisPool::new(&settings.redis)
        .await
        .context("Failed to initialize Redis pool")?;
    redis_pool
        .ping()
        .await
        .context("Redis did not answer PING")?;

    info!("Redis pool initialized");
    Ok(redis_pool)
}

/// Run lock: Redis when configured, otherwise in-process
#[tracing::instrument(skip(settings))]
pub async fn init_lock(settings: &Settings) -> Result<Arc<dyn DistributedLock>> {
    if settings.redis.url.is_empty() {
        warn!("Redis not configured, cron runs are only serialized within this process");
        return Ok(Arc::new(LocalLock::new()));
    }
    let pool = init_redis_pool(settings).await?;
    Ok(Arc::new(RedLock::new(pool)))
}

/// Built-in plugins backed by PostgreSQL
pub fn build_registry(settings: &Settings, db_pool: &DbPool) -> PluginRegistry {
    let pool = db_pool.pool().clone();
    PluginRegistry::new(settings.scheduler.enabled_modules.clone())
        .with_plugin(Arc::new(NodeScheduler::new(Arc::new(PostgresStorage::new(
            pool.clone(),
            "node",
            true,
        )))))
        .with_plugin(Arc::new(MediaScheduler::new(Arc::new(PostgresStorage::new(
            pool, "media", false,
        )))))
}

pub fn build_manager(settings: &Settings, db_pool: &DbPool) -> Arc<SchedulerManager> {
    let registry = build_registry(settings, db_pool);
    info!(
        entity_types = ?registry.entity_types(None),
        "Scheduler plugins registered"
    );
    Arc::new(SchedulerManager::new(
        settings.scheduler.clone(),
        Arc::new(registry),
    ))
}

/// Manager plus run lock, ready for any trigger
pub async fn init_cron(settings: &Settings) -> Result<Arc<LightweightCron>> {
    let db_pool = init_database_pool(settings).await?;
    let lock = init_lock(settings).await?;
    let manager = build_manager(settings, &db_pool);
    Ok(Arc::new(LightweightCron::new(
        manager,
        lock,
        Duration::from_secs(settings.cron.lock_ttl_seconds),
    )))
}
