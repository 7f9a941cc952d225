use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

/// Authentication middleware for the admin routes
///
/// Expects `Authorization: Bearer <cron.admin_token>`.
#[tracing::instrument(skip(state, req, next))]
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        tracing::warn!("Invalid authorization header format");
        return Err(StatusCode::UNAUTHORIZED);
    };

    match state.admin_token.verify(token) {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::warn!("Invalid admin token");
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            tracing::error!(error = %e, "Admin token check failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
