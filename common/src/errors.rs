// Error handling framework

use crate::models::{ItemId, Process};
use thiserror::Error;

/// Scheduled-transition engine errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A due item belongs to a bundle not enabled for the process
    #[error(
        "'{label}' (id {id}) was not {} because {entity_type} {type_field} '{bundle_label}' is not enabled for scheduled {}. One of the following hook functions added the id incorrectly: {}. Processing halted",
        .process.past_tense(),
        .process.progressive(),
        .hooks.join(", ")
    )]
    EntityTypeNotEnabled {
        id: ItemId,
        label: String,
        process: Process,
        entity_type: String,
        type_field: String,
        bundle_label: String,
        hooks: Vec<String>,
    },

    #[error("Action '{action_id}' is missing. Scheduled {process} halted.")]
    MissingAction { action_id: String, process: Process },

    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Redis error: {0}")]
    RedisError(String),

    #[error("Lock already held: {0}")]
    LockHeld(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

/// Extension registration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HookError {
    #[error("Handler for '{point}' does not match the hook signature")]
    SignatureMismatch { point: String },

    #[error("Unknown hook point: {0}")]
    UnknownPoint(String),
}

/// Schedule validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("The 'publish on' date must be in the future.")]
    PublishOnInPast,

    #[error("The 'unpublish on' date must be in the future.")]
    UnpublishOnInPast,

    #[error("The 'unpublish on' date must be later than the 'publish on' date.")]
    UnpublishBeforePublish,

    #[error("A 'publish on' date is required.")]
    PublishOnRequired,

    #[error("If you set a 'publish on' date then you must also set an 'unpublish on' date.")]
    UnpublishOnRequired,

    #[error("Either you must set an 'unpublish on' date or save this node as unpublished.")]
    UnpublishOnRequiredWhenPublished,

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },
}

/// Lightweight cron errors
#[derive(Error, Debug)]
pub enum CronError {
    #[error("A lightweight cron run is already in progress")]
    AlreadyRunning,

    #[error("Invalid cron access key")]
    InvalidAccessKey,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for CronError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LockHeld(_) => CronError::AlreadyRunning,
            other => CronError::Storage(other),
        }
    }
}

/// API response error type for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        let code = match err {
            SchedulerError::EntityTypeNotEnabled { .. } | SchedulerError::MissingAction { .. } => {
                "CONFIGURATION_ERROR"
            }
            SchedulerError::UnknownEntityType(_) => "NOT_FOUND",
            SchedulerError::Storage(_) => "STORAGE_ERROR",
            SchedulerError::Hook(_) => "HOOK_ERROR",
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<CronError> for ApiError {
    fn from(err: CronError) -> Self {
        match err {
            CronError::AlreadyRunning => ApiError::new("CONFLICT", err.to_string()),
            CronError::InvalidAccessKey => ApiError::new("FORBIDDEN", err.to_string()),
            CronError::Scheduler(inner) => inner.into(),
            CronError::Storage(inner) => inner.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new("VALIDATION_ERROR", err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::new("STORAGE_ERROR", err.to_string())
    }
}

impl From<HookError> for ApiError {
    fn from(err: HookError) -> Self {
        ApiError::new("HOOK_ERROR", err.to_string())
    }
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => DatabaseError::DuplicateKey(db_err.message().to_string()),
                _ => DatabaseError::QueryFailed(db_err.message().to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<DatabaseError> for StorageError {
    fn from(err: DatabaseError) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::RedisError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bundle_message() {
        let err = SchedulerError::EntityTypeNotEnabled {
            id: 12,
            label: "Launch notes".to_string(),
            process: Process::Publish,
            entity_type: "node".to_string(),
            type_field: "type".to_string(),
            bundle_label: "Article".to_string(),
            hooks: vec!["list".to_string(), "node_scheduler_nid_list".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "'Launch notes' (id 12) was not published because node type 'Article' is not enabled \
             for scheduled publishing. One of the following hook functions added the id \
             incorrectly: list, node_scheduler_nid_list. Processing halted"
        );
    }

    #[test]
    fn test_missing_action_message() {
        let err = SchedulerError::MissingAction {
            action_id: "media_unpublish_action".to_string(),
            process: Process::Unpublish,
        };
        assert_eq!(
            err.to_string(),
            "Action 'media_unpublish_action' is missing. Scheduled unpublish halted."
        );
    }

    #[test]
    fn test_lock_held_maps_to_already_running() {
        let err: CronError =
            StorageError::LockHeld("scheduler:lightweight_cron".to_string()).into();
        assert!(matches!(err, CronError::AlreadyRunning));
    }

    #[test]
    fn test_api_error_conversion() {
        let api: ApiError = CronError::InvalidAccessKey.into();
        assert_eq!(api.code, "FORBIDDEN");

        let api: ApiError = SchedulerError::UnknownEntityType("comment".to_string()).into();
        assert_eq!(api.code, "NOT_FOUND");
        assert!(api.details.is_none());
    }

    #[test]
    fn test_validation_messages() {
        assert_eq!(
            ValidationError::UnpublishBeforePublish.to_string(),
            "The 'unpublish on' date must be later than the 'publish on' date."
        );
    }
}
