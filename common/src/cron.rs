// Lightweight cron: the shared entry point of every trigger

use crate::errors::{CronError, ValidationError};
use crate::lock::{DistributedLock, LockGuard};
use crate::models::Process;
use crate::scheduler::{CronReport, PassReport, SchedulerManager};
use crate::telemetry;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// Lock resource serializing cron runs
pub const CRON_LOCK_RESOURCE: &str = "scheduler:lightweight_cron";

/// What started a cron run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CronTrigger {
    Url,
    CommandLine,
    AdminUserForm,
    Daemon,
}

impl CronTrigger {
    pub fn label(self) -> &'static str {
        match self {
            CronTrigger::Url => "url",
            CronTrigger::CommandLine => "command line",
            CronTrigger::AdminUserForm => "admin user form",
            CronTrigger::Daemon => "daemon",
        }
    }
}

impl fmt::Display for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CronOptions {
    /// Suppress the start/complete notices
    pub nolog: bool,
}

/// Runs `publish()` then `unpublish()` under the run lock
pub struct LightweightCron {
    manager: Arc<SchedulerManager>,
    lock: Arc<dyn DistributedLock>,
    lock_ttl: Duration,
}

impl LightweightCron {
    pub fn new(
        manager: Arc<SchedulerManager>,
        lock: Arc<dyn DistributedLock>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            manager,
            lock,
            lock_ttl,
        }
    }

    pub fn manager(&self) -> &Arc<SchedulerManager> {
        &self.manager
    }

    #[instrument(skip(self), fields(trigger = %trigger))]
    pub async fn run(
        &self,
        trigger: CronTrigger,
        options: CronOptions,
    ) -> Result<CronReport, CronError> {
        let mut guard = self.acquire(trigger).await?;

        let log = self.manager.settings().log && !options.nolog;
        if log {
            info!("Lightweight cron run activated by {}.", trigger);
        }

        let result = self.run_passes(trigger, &mut guard).await;
        let elapsed = guard.elapsed();
        drop(guard);

        match &result {
            Ok(report) => {
                telemetry::record_cron_run(trigger.label(), "ok");
                if log {
                    info!(
                        changed = report.changed(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Lightweight cron run completed."
                    );
                }
            }
            Err(e) => {
                telemetry::record_cron_run(trigger.label(), "error");
                error!(error = %e, "Lightweight cron run failed");
            }
        }
        result
    }

    /// Single pass under the same run lock as `run`
    #[instrument(skip(self), fields(trigger = %trigger, process = %process))]
    pub async fn run_process(
        &self,
        trigger: CronTrigger,
        process: Process,
    ) -> Result<PassReport, CronError> {
        let guard = self.acquire(trigger).await?;
        let result = self.manager.run(process).await.map_err(CronError::from);
        drop(guard);

        match &result {
            Ok(report) => {
                telemetry::record_cron_run(trigger.label(), "ok");
                debug!(changed = report.changed(), "Scheduled {} pass completed", process);
            }
            Err(e) => {
                telemetry::record_cron_run(trigger.label(), "error");
                error!(error = %e, "Scheduled {} pass failed", process);
            }
        }
        result
    }

    async fn acquire(&self, trigger: CronTrigger) -> Result<LockGuard, CronError> {
        self.lock
            .acquire(CRON_LOCK_RESOURCE, self.lock_ttl)
            .await
            .map_err(|e| {
                let err = CronError::from(e);
                if matches!(err, CronError::AlreadyRunning) {
                    warn!("Lightweight cron run skipped, another run is in progress");
                    telemetry::record_cron_run(trigger.label(), "locked");
                }
                err
            })
    }

    async fn run_passes(
        &self,
        trigger: CronTrigger,
        guard: &mut LockGuard,
    ) -> Result<CronReport, CronError> {
        let publish = self.manager.run(Process::Publish).await?;
        // The unpublish pass gets a full TTL of its own
        if let Err(e) = guard.extend(self.lock_ttl).await {
            warn!(error = %e, "Could not extend the cron run lock");
        }
        let unpublish = self.manager.run(Process::Unpublish).await?;
        Ok(CronReport {
            trigger: trigger.label().to_string(),
            publish,
            unpublish,
        })
    }
}

/// Periodic cron trigger with graceful shutdown
pub struct CronDaemon {
    cron: Arc<LightweightCron>,
    poll_interval: Duration,
    shutdown_tx: broadcast::Sender<()>,
}

impl CronDaemon {
    pub fn new(cron: Arc<LightweightCron>, poll_interval: Duration) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            cron,
            poll_interval,
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Poll until `stop` is called
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            poll_interval_seconds = self.poll_interval.as_secs(),
            "Starting cron daemon"
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.cron.run(CronTrigger::Daemon, CronOptions::default()).await {
                        Ok(report) => debug!(changed = report.changed(), "Cron tick finished"),
                        Err(CronError::AlreadyRunning) => debug!("Cron tick skipped"),
                        Err(e) => error!(error = %e, "Cron tick failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping cron daemon");
                    break;
                }
            }
        }

        info!("Cron daemon stopped");
    }

    pub fn stop(&self) {
        info!("Stopping cron daemon");
        let _ = self.shutdown_tx.send(());
    }
}

/// Secret guarding the cron URL
pub struct AccessKey {
    key: RwLock<String>,
    salt: [u8; 32],
}

impl AccessKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: RwLock::new(key.into()),
            salt: rand::thread_rng().gen(),
        }
    }

    /// Configured key, or a fresh one when none is configured
    pub fn from_config(configured: &str) -> Self {
        if configured.is_empty() {
            info!("No cron access key configured, generated a new one");
            Self::new(Self::generate())
        } else {
            Self::new(configured)
        }
    }

    /// 32 lowercase hex characters
    pub fn generate() -> String {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        hex::encode(bytes)
    }

    pub fn current(&self) -> String {
        self.key.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn rotate(&self) -> String {
        let key = Self::generate();
        *self.key.write().unwrap_or_else(|e| e.into_inner()) = key.clone();
        info!("Cron access key rotated");
        key
    }

    /// Constant-time comparison of keyed digests
    pub fn verify(&self, candidate: &str) -> Result<bool, ValidationError> {
        let expected = self.digest(&self.current())?;
        let mut mac = self.mac()?;
        mac.update(candidate.as_bytes());
        Ok(mac.verify_slice(&expected).is_ok())
    }

    fn digest(&self, value: &str) -> Result<Vec<u8>, ValidationError> {
        let mut mac = self.mac()?;
        mac.update(value.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self) -> Result<HmacSha256, ValidationError> {
        HmacSha256::new_from_slice(&self.salt).map_err(|e| ValidationError::InvalidFieldValue {
            field: "access_key".to_string(),
            reason: e.to_string(),
        })
    }
}
