// Configuration management with layered configuration (file, env)

use crate::models::Process;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cron: CronConfig,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Empty disables Redis; the run lock then stays in-process
    #[serde(default)]
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Lightweight cron access key; generated at startup when empty
    #[serde(default)]
    pub access_key: String,
    pub admin_token: String,
    pub lock_ttl_seconds: u64,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

// ============================================================================
// Scheduling settings
// ============================================================================

/// What to do with a `publish_on` date that is already in the past on save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PastDatePolicy {
    /// Reject the date
    #[default]
    Error,
    /// Publish immediately on save
    Publish,
    /// Keep it scheduled for the next cron run
    Schedule,
}

/// Per-bundle overrides; unset keys fall back to the global defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOverrides {
    pub publish_enable: Option<bool>,
    pub unpublish_enable: Option<bool>,
    pub publish_required: Option<bool>,
    pub unpublish_required: Option<bool>,
    pub publish_past_date: Option<PastDatePolicy>,
    pub publish_past_date_created: Option<bool>,
    pub publish_touch: Option<bool>,
    pub publish_revision: Option<bool>,
    pub unpublish_revision: Option<bool>,
}

/// Fully-resolved capability settings of one bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BundleSettings {
    pub publish_enable: bool,
    pub unpublish_enable: bool,
    pub publish_required: bool,
    pub unpublish_required: bool,
    pub publish_past_date: PastDatePolicy,
    pub publish_past_date_created: bool,
    pub publish_touch: bool,
    pub publish_revision: bool,
    pub unpublish_revision: bool,
}

impl BundleSettings {
    pub fn enabled(&self, process: Process) -> bool {
        match process {
            Process::Publish => self.publish_enable,
            Process::Unpublish => self.unpublish_enable,
        }
    }

    pub fn revision(&self, process: Process) -> bool {
        match process {
            Process::Publish => self.publish_revision,
            Process::Unpublish => self.unpublish_revision,
        }
    }
}

/// Global engine settings, read at the start of every pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub default_publish_enable: bool,
    pub default_unpublish_enable: bool,
    pub default_publish_required: bool,
    pub default_unpublish_required: bool,
    pub default_publish_past_date: PastDatePolicy,
    pub default_publish_past_date_created: bool,
    pub default_publish_touch: bool,
    pub default_publish_revision: bool,
    pub default_unpublish_revision: bool,
    /// Outcome logging
    pub log: bool,
    /// Use content-moderation state change actions
    pub moderation_actions: bool,
    /// Modules whose capability providers may register
    pub enabled_modules: Vec<String>,
    /// `bundles.<entity_type>.<bundle>` overrides
    pub bundles: HashMap<String, HashMap<String, BundleOverrides>>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_publish_enable: false,
            default_unpublish_enable: false,
            default_publish_required: false,
            default_unpublish_required: false,
            default_publish_past_date: PastDatePolicy::Error,
            default_publish_past_date_created: false,
            default_publish_touch: false,
            default_publish_revision: false,
            default_unpublish_revision: false,
            log: true,
            moderation_actions: false,
            enabled_modules: vec!["node".to_string(), "media".to_string()],
            bundles: HashMap::new(),
        }
    }
}

impl SchedulerSettings {
    /// Resolve the settings of one bundle against the global defaults
    pub fn bundle(&self, entity_type: &str, bundle: &str) -> BundleSettings {
        let empty = BundleOverrides::default();
        let o = self
            .bundles
            .get(entity_type)
            .and_then(|bundles| bundles.get(bundle))
            .unwrap_or(&empty);

        BundleSettings {
            publish_enable: o.publish_enable.unwrap_or(self.default_publish_enable),
            unpublish_enable: o.unpublish_enable.unwrap_or(self.default_unpublish_enable),
            publish_required: o.publish_required.unwrap_or(self.default_publish_required),
            unpublish_required: o
                .unpublish_required
                .unwrap_or(self.default_unpublish_required),
            publish_past_date: o
                .publish_past_date
                .unwrap_or(self.default_publish_past_date),
            publish_past_date_created: o
                .publish_past_date_created
                .unwrap_or(self.default_publish_past_date_created),
            publish_touch: o.publish_touch.unwrap_or(self.default_publish_touch),
            publish_revision: o.publish_revision.unwrap_or(self.default_publish_revision),
            unpublish_revision: o
                .unpublish_revision
                .unwrap_or(self.default_unpublish_revision),
        }
    }

    /// Set one override, creating the bundle entry on demand
    pub fn set_bundle(
        &mut self,
        entity_type: &str,
        bundle: &str,
        update: impl FnOnce(&mut BundleOverrides),
    ) {
        let overrides = self
            .bundles
            .entry(entity_type.to_string())
            .or_default()
            .entry(bundle.to_string())
            .or_default();
        update(overrides);
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.cron.poll_interval_seconds == 0 {
            return Err("Cron poll_interval_seconds must be greater than 0".to_string());
        }
        if self.cron.lock_ttl_seconds == 0 {
            return Err("Cron lock_ttl_seconds must be greater than 0".to_string());
        }
        if self.cron.admin_token.is_empty() {
            return Err("Cron admin_token cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/content_scheduler".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            redis: RedisConfig {
                url: "redis://localhost:6379".to_string(),
                pool_size: 10,
            },
            cron: CronConfig {
                access_key: String::new(),
                admin_token: "change-me-in-production".to_string(),
                lock_ttl_seconds: 300,
                poll_interval_seconds: 60,
            },
            scheduler: SchedulerSettings::default(),
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                metrics_port: 9090,
                tracing_endpoint: None,
            },
        }
    }
}
