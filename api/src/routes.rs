use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Create the main application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes; the cron URL carries its own key
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/scheduler/cron/:key",
            get(handlers::cron::lightweight_cron),
        );

    let admin_routes = Router::new()
        .route("/api/scheduler/cron", post(handlers::cron::run_cron))
        .route(
            "/api/scheduler/access-key",
            post(handlers::cron::rotate_access_key),
        )
        .route("/api/scheduler/plugins", get(handlers::plugins::list_plugins))
        .route(
            "/api/scheduler/plugins/invalidate",
            post(handlers::plugins::invalidate_plugins),
        )
        .route(
            "/api/scheduler/schedule/validate",
            post(handlers::schedule::validate),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use common::clock::FixedClock;
    use common::config::SchedulerSettings;
    use common::cron::{AccessKey, LightweightCron, CRON_LOCK_RESOURCE};
    use common::lock::{DistributedLock, LocalLock};
    use common::models::{ContentEntity, ContentTranslation};
    use common::scheduler::{NodeScheduler, PluginRegistry, SchedulerManager};
    use common::storage::InMemoryStorage;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const NOW: i64 = 1_700_000_000;

    struct Harness {
        storage: Arc<InMemoryStorage>,
        lock: Arc<LocalLock>,
        state: AppState,
    }

    fn harness() -> Harness {
        let storage =
            Arc::new(InMemoryStorage::new("node", true).with_bundle("article", "Article"));
        let mut t = ContentTranslation::new("en", "Scheduled", NOW - 100);
        t.publish_on = Some(NOW - 10);
        storage.insert(ContentEntity::new(1, "node", "article", t));

        let mut settings = SchedulerSettings::default();
        settings.set_bundle("node", "article", |o| o.publish_enable = Some(true));
        let registry = PluginRegistry::new(["node"])
            .with_plugin(Arc::new(NodeScheduler::new(storage.clone())));
        let manager = SchedulerManager::new(settings, Arc::new(registry))
            .with_clock(Arc::new(FixedClock::new(NOW)));

        let lock = Arc::new(LocalLock::new());
        let cron = Arc::new(LightweightCron::new(
            Arc::new(manager),
            lock.clone(),
            Duration::from_secs(60),
        ));
        Harness {
            storage,
            lock,
            state: AppState::new(cron, AccessKey::new("k3y"), "admin-token"),
        }
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn admin_post(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(harness().state);
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["entity_types"][0], "node");
    }

    #[tokio::test]
    async fn test_cron_url_runs_with_valid_key() {
        let h = harness();
        let app = create_router(h.state);

        let response = app.oneshot(get_request("/scheduler/cron/k3y")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(h.storage.get(1).unwrap().translations[0].published);
    }

    #[tokio::test]
    async fn test_cron_url_rejects_bad_key() {
        let h = harness();
        let app = create_router(h.state);

        let response = app.oneshot(get_request("/scheduler/cron/wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!h.storage.get(1).unwrap().translations[0].published);
    }

    #[tokio::test]
    async fn test_cron_url_conflict_while_running() {
        let h = harness();
        let _held = h
            .lock
            .acquire(CRON_LOCK_RESOURCE, Duration::from_secs(60))
            .await
            .unwrap();
        let app = create_router(h.state);

        let response = app.oneshot(get_request("/scheduler/cron/k3y")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let app = create_router(harness().state);
        let response = app
            .oneshot(admin_post("/api/scheduler/cron", "nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_cron_returns_report() {
        let app = create_router(harness().state);
        let response = app
            .oneshot(admin_post("/api/scheduler/cron", "admin-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["trigger"], "admin user form");
        assert_eq!(json["data"]["publish"]["outcomes"][0]["state"], "committed");
    }

    #[tokio::test]
    async fn test_rotate_invalidates_old_key() {
        let h = harness();
        let app = create_router(h.state.clone());

        let response = app
            .clone()
            .oneshot(admin_post("/api/scheduler/access-key", "admin-token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let new_key = json["data"]["access_key"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(get_request("/scheduler/cron/k3y"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(get_request(&format!("/scheduler/cron/{}", new_key)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    fn admin_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Authorization", "Bearer admin-token")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_validate_schedule() {
        let app = create_router(harness().state);

        let response = app
            .clone()
            .oneshot(admin_json(
                "/api/scheduler/schedule/validate",
                serde_json::json!({
                    "entity_type": "node",
                    "bundle": "article",
                    "publish_on": NOW + 60,
                    "unpublish_on": NOW + 3_600
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(admin_json(
                "/api/scheduler/schedule/validate",
                serde_json::json!({
                    "entity_type": "node",
                    "bundle": "article",
                    "publish_on": NOW + 60,
                    "unpublish_on": NOW + 30
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "validation_error");
        assert_eq!(
            json["details"][0],
            "The 'unpublish on' date must be later than the 'publish on' date."
        );
    }

    #[tokio::test]
    async fn test_validate_unknown_entity_type() {
        let app = create_router(harness().state);
        let response = app
            .oneshot(admin_json(
                "/api/scheduler/schedule/validate",
                serde_json::json!({ "entity_type": "comment", "bundle": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_plugins() {
        let app = create_router(harness().state);
        let request = Request::builder()
            .uri("/api/scheduler/plugins")
            .header("Authorization", "Bearer admin-token")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"][0]["id"], "node_scheduler");
    }
}
