use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::handlers::{ErrorResponse, SuccessResponse};
use crate::state::AppState;
use common::cron::{CronOptions, CronTrigger};
use common::errors::{ApiError, CronError};
use common::scheduler::CronReport;

#[derive(Debug, Serialize)]
pub struct AccessKeyResponse {
    pub access_key: String,
}

/// Lightweight cron URL
///
/// 204 on success, 403 on a bad key, 409 while another run holds the lock.
#[tracing::instrument(skip(state, key))]
pub async fn lightweight_cron(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.access_key.verify(&key) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("Lightweight cron called with an invalid access key");
            return ErrorResponse::from(ApiError::from(CronError::InvalidAccessKey)).into_response();
        }
        Err(e) => return ErrorResponse::from(ApiError::from(e)).into_response(),
    }

    match state
        .cron
        .run(CronTrigger::Url, CronOptions::default())
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ErrorResponse::from(ApiError::from(e)).into_response(),
    }
}

/// Interactive run from the admin form
#[tracing::instrument(skip(state))]
pub async fn run_cron(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<CronReport>>, ErrorResponse> {
    let report = state
        .cron
        .run(CronTrigger::AdminUserForm, CronOptions::default())
        .await
        .map_err(ApiError::from)?;
    Ok(Json(SuccessResponse::new(report)))
}

/// Replace the cron access key; the old URL stops working
#[tracing::instrument(skip(state))]
pub async fn rotate_access_key(
    State(state): State<AppState>,
) -> Json<SuccessResponse<AccessKeyResponse>> {
    let access_key = state.access_key.rotate();
    Json(SuccessResponse::new(AccessKeyResponse { access_key }))
}
