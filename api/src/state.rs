use std::sync::Arc;

use common::cron::{AccessKey, LightweightCron};
use common::scheduler::SchedulerManager;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub cron: Arc<LightweightCron>,
    /// Key embedded in the lightweight cron URL
    pub access_key: Arc<AccessKey>,
    /// Bearer token of the admin routes
    pub admin_token: Arc<AccessKey>,
}

impl AppState {
    /// Create a new AppState instance
    pub fn new(cron: Arc<LightweightCron>, access_key: AccessKey, admin_token: &str) -> Self {
        Self {
            cron,
            access_key: Arc::new(access_key),
            admin_token: Arc::new(AccessKey::new(admin_token)),
        }
    }

    pub fn manager(&self) -> &Arc<SchedulerManager> {
        self.cron.manager()
    }
}
