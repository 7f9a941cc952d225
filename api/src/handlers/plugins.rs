use axum::{extract::State, Json};

use crate::handlers::SuccessResponse;
use crate::state::AppState;
use common::scheduler::CapabilityDescriptor;

/// Descriptors of the enabled scheduler plugins, in processing order
#[tracing::instrument(skip(state))]
pub async fn list_plugins(
    State(state): State<AppState>,
) -> Json<SuccessResponse<Vec<CapabilityDescriptor>>> {
    Json(SuccessResponse::new(state.manager().registry().descriptors()))
}

/// Drop the plugin cache; returns the entity types after the rebuild
#[tracing::instrument(skip(state))]
pub async fn invalidate_plugins(
    State(state): State<AppState>,
) -> Json<SuccessResponse<Vec<String>>> {
    let registry = state.manager().registry();
    registry.invalidate();
    tracing::info!("Scheduler plugin cache invalidated");
    Json(SuccessResponse::new(registry.entity_types(None)))
}
