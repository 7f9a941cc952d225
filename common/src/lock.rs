// Run-level mutual exclusion for cron triggers
//
// The engine itself never serializes passes; every trigger acquires the
// run lock through `DistributedLock` before calling into it.

use crate::db::RedisPool;
use crate::errors::StorageError;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Distributed lock trait for ensuring exclusive access to resources
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Acquire a lock on the specified resource with a TTL
    ///
    /// Fails with `StorageError::LockHeld` when another holder owns it.
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockGuard, StorageError>;
}

enum GuardBackend {
    Redis(RedisPool),
    Local(Arc<Mutex<HashMap<String, LocalEntry>>>),
}

/// Lock guard that automatically releases the lock when dropped
pub struct LockGuard {
    resource: String,
    lock_value: String,
    backend: GuardBackend,
    acquired_at: Instant,
    ttl: Duration,
}

impl LockGuard {
    /// Extend the lock TTL for long-running operations
    #[instrument(skip(self), fields(resource = %self.resource, ttl_seconds = ?self.ttl.as_secs()))]
    pub async fn extend(&mut self, additional_ttl: Duration) -> Result<(), StorageError> {
        let new_ttl = self.ttl + additional_ttl;

        match &self.backend {
            GuardBackend::Redis(pool) => {
                let mut conn = pool.get_connection();
                let key = lock_key(&self.resource);

                // Check if we still own the lock
                let current_value: Option<String> = conn
                    .get(&key)
                    .await
                    .map_err(|e| StorageError::RedisError(format!("Failed to check lock: {}", e)))?;

                if current_value.as_ref() != Some(&self.lock_value) {
                    return Err(StorageError::LockHeld(self.resource.clone()));
                }

                let _: () = conn
                    .expire(&key, new_ttl.as_secs() as i64)
                    .await
                    .map_err(|e| {
                        StorageError::RedisError(format!("Failed to extend lock: {}", e))
                    })?;
            }
            GuardBackend::Local(held) => {
                let mut held = held.lock().unwrap_or_else(|e| e.into_inner());
                match held.get_mut(&self.resource) {
                    Some(entry) if entry.token == self.lock_value => {
                        entry.expires_at = self.acquired_at + new_ttl;
                    }
                    _ => return Err(StorageError::LockHeld(self.resource.clone())),
                }
            }
        }

        self.ttl = new_ttl;
        info!(
            resource = %self.resource,
            new_ttl_seconds = new_ttl.as_secs(),
            "Lock TTL extended"
        );

        Ok(())
    }

    /// Get the resource name this lock guards
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Get the time elapsed since lock acquisition
    pub fn elapsed(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match &self.backend {
            GuardBackend::Local(held) => {
                let mut held = held.lock().unwrap_or_else(|e| e.into_inner());
                if held
                    .get(&self.resource)
                    .is_some_and(|entry| entry.token == self.lock_value)
                {
                    held.remove(&self.resource);
                    debug!(resource = %self.resource, "Local lock released");
                }
            }
            GuardBackend::Redis(pool) => {
                // Release the lock asynchronously
                let resource = self.resource.clone();
                let lock_value = self.lock_value.clone();
                let pool = pool.clone();

                tokio::spawn(async move {
                    if let Err(e) = release_lock(&pool, &resource, &lock_value).await {
                        warn!(
                            resource = %resource,
                            error = %e,
                            "Failed to release lock on drop"
                        );
                    }
                });
            }
        }
    }
}

fn lock_key(resource: &str) -> String {
    format!("lock:{}", resource)
}

// ============================================================================
// In-process lock
// ============================================================================

struct LocalEntry {
    token: String,
    expires_at: Instant,
}

/// In-process lock for single-node deployments and tests
#[derive(Clone, Default)]
pub struct LocalLock {
    held: Arc<Mutex<HashMap<String, LocalEntry>>>,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for LocalLock {
    #[instrument(skip(self), fields(resource = %resource, ttl_seconds = ?ttl.as_secs()))]
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockGuard, StorageError> {
        let now = Instant::now();
        let token = Uuid::new_v4().to_string();

        {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = held.get(resource) {
                if entry.expires_at > now {
                    debug!(resource = %resource, "Local lock already held");
                    return Err(StorageError::LockHeld(resource.to_string()));
                }
            }
            held.insert(
                resource.to_string(),
                LocalEntry {
                    token: token.clone(),
                    expires_at: now + ttl,
                },
            );
        }

        debug!(resource = %resource, "Local lock acquired");
        Ok(LockGuard {
            resource: resource.to_string(),
            lock_value: token,
            backend: GuardBackend::Local(self.held.clone()),
            acquired_at: now,
            ttl,
        })
    }
}

// ============================================================================
// Redis lock
// ============================================================================

/// Redis lock: `SET NX EX`, released by an owner-checked script
///
/// A single attempt: a held cron lock means a run is in progress.
pub struct RedLock {
    pool: RedisPool,
}

impl RedLock {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributedLock for RedLock {
    #[instrument(skip(self), fields(resource = %resource, ttl_seconds = ?ttl.as_secs()))]
    async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockGuard, StorageError> {
        let mut conn = self.pool.get_connection();
        let key = lock_key(resource);
        let lock_value = Uuid::new_v4().to_string();

        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&lock_value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::RedisError(format!("Failed to acquire lock: {}", e)))?;

        if result.is_none() {
            debug!(resource = %resource, "Redis lock already held");
            return Err(StorageError::LockHeld(resource.to_string()));
        }

        info!(resource = %resource, "Redis lock acquired");
        Ok(LockGuard {
            resource: resource.to_string(),
            lock_value,
            backend: GuardBackend::Redis(self.pool.clone()),
            acquired_at: Instant::now(),
            ttl,
        })
    }
}

/// Release a lock by deleting the key if it matches the lock value
async fn release_lock(
    pool: &RedisPool,
    resource: &str,
    lock_value: &str,
) -> Result<(), StorageError> {
    let mut conn = pool.get_connection();
    let key = lock_key(resource);

    // Only the owner may delete the key
    let script = r#"
        if redis.call("get", KEYS[1]) == ARGV[1] then
            return redis.call("del", KEYS[1])
        else
            return 0
        end
    "#;

    let result: i32 = redis::Script::new(script)
        .key(&key)
        .arg(lock_value)
        .invoke_async(&mut conn)
        .await
        .map_err(|e| StorageError::RedisError(format!("Failed to release lock: {}", e)))?;

    if result == 1 {
        debug!(
            resource = %resource,
            lock_value = %lock_value,
            "Lock released successfully"
        );
    } else {
        warn!(
            resource = %resource,
            lock_value = %lock_value,
            "Lock was not owned or already expired"
        );
    }

    Ok(())
}
