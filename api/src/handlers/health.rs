use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Content kinds the engine will process
    pub entity_types: Vec<String>,
    pub log: bool,
}

/// Liveness plus the scheduler's current view of its plugins
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let manager = state.manager();
    Json(HealthResponse {
        status: "ok",
        entity_types: manager.registry().entity_types(None),
        log: manager.settings().log,
    })
}
