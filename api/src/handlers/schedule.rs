use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::config::PastDatePolicy;
use common::errors::{ApiError, SchedulerError};
use common::models::Timestamp;
use common::validation::{validate_schedule, ScheduleInput};

#[derive(Debug, Deserialize)]
pub struct ValidateScheduleRequest {
    pub entity_type: String,
    pub bundle: String,
    pub publish_on: Option<Timestamp>,
    pub unpublish_on: Option<Timestamp>,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateScheduleResponse {
    pub valid: bool,
    pub publish_past_date: PastDatePolicy,
}

/// Check submitted dates against the bundle's scheduling rules
///
/// 400 with every violation in `details` when rejected.
#[tracing::instrument(
    skip(state, request),
    fields(entity_type = %request.entity_type, bundle = %request.bundle)
)]
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateScheduleRequest>,
) -> Result<Json<SuccessResponse<ValidateScheduleResponse>>, ErrorResponse> {
    let manager = state.manager();
    if manager.registry().get(&request.entity_type).is_none() {
        return Err(ApiError::from(SchedulerError::UnknownEntityType(request.entity_type)).into());
    }

    let bundle = manager
        .settings()
        .bundle(&request.entity_type, &request.bundle);
    let input = ScheduleInput {
        publish_on: request.publish_on,
        unpublish_on: request.unpublish_on,
        published: request.published,
    };

    if let Err(errors) = validate_schedule(&input, &bundle, manager.now()) {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        tracing::debug!(violations = messages.len(), "Schedule rejected");
        return Err(ApiError::new("VALIDATION_ERROR", "Schedule rejected")
            .with_details(serde_json::json!(messages))
            .into());
    }

    Ok(Json(SuccessResponse::new(ValidateScheduleResponse {
        valid: true,
        publish_past_date: bundle.publish_past_date,
    })))
}
