use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::database::DatabaseManager;
use crate::handlers::{protected, public};
use crate::middleware::{cors_layer, jwt_auth_middleware, request_stats_middleware};
use crate::storage::{LocalDiskStore, ObjectStore};

/// Full application router
pub fn router(config: &AppConfig) -> Router {
    let store: Arc<dyn ObjectStore> = Arc::new(LocalDiskStore::new(
        &config.storage.root_dir,
        &config.storage.public_url,
    ));
    app(config, store)
}

/// Router with an explicit document store
pub fn app(config: &AppConfig, store: Arc<dyn ObjectStore>) -> Router {
    let protected = Router::new()
        .merge(auth_routes())
        .merge(user_routes())
        .merge(job_routes())
        .merge(lead_routes())
        .merge(client_routes())
        .merge(application_routes())
        .merge(follow_up_routes())
        .merge(notification_routes())
        .merge(onboarding_routes())
        .merge(rule_routes())
        .merge(analytics_routes())
        .merge(admin_routes())
        .layer(middleware::from_fn(jwt_auth_middleware));

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(public_routes())
        // Protected API
        .merge(protected)
        // Global middleware
        .layer(Extension(store))
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(middleware::from_fn(request_stats_middleware))
        .layer(cors_layer(config.security.cors_origins.clone()))
        .layer(TraceLayer::new_for_http())
}

fn public_routes() -> Router {
    Router::new()
        .route("/api/auth/login", post(public::auth::login))
        .route("/api/auth/logout", post(public::auth::logout))
        .route("/api/onboarding-forms/:id/public", get(public::onboarding::public_view))
        .route("/api/onboarding-forms/:id/submit", post(public::onboarding::submit))
        .route("/api/cron/followups", get(public::cron::followups))
        .route(
            "/api/cron/application-followups",
            post(public::cron::application_followups),
        )
}

fn auth_routes() -> Router {
    Router::new().route("/api/auth/me", get(protected::auth::me))
}

fn user_routes() -> Router {
    use protected::users;

    Router::new()
        .route("/api/users", get(users::list).post(users::create))
        .route(
            "/api/users/:id",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route("/api/users/:id/unlock", post(users::unlock))
        .route("/api/users/:id/reset-password", post(users::reset_password))
}

fn job_routes() -> Router {
    use protected::jobs;

    Router::new()
        .route("/api/jobs", get(jobs::list).post(jobs::create))
        .route("/api/jobs/bulk", post(jobs::bulk_create))
        .route(
            "/api/jobs/:id",
            get(jobs::get).put(jobs::update).delete(jobs::delete),
        )
}

fn lead_routes() -> Router {
    use protected::leads;

    Router::new()
        .route("/api/leads", get(leads::list).post(leads::create))
        .route(
            "/api/leads/:id",
            get(leads::get).put(leads::update).delete(leads::delete),
        )
        .route(
            "/api/leads/:id/documents",
            get(leads::list_documents).post(leads::upload_document),
        )
        .route(
            "/api/leads/:id/documents/:doc_id",
            axum::routing::delete(leads::delete_document),
        )
}

fn client_routes() -> Router {
    use protected::clients;

    Router::new()
        .route("/api/clients", get(clients::list).post(clients::create))
        .route(
            "/api/clients/:id",
            get(clients::get).put(clients::update).delete(clients::delete),
        )
}

fn application_routes() -> Router {
    use protected::applications;

    Router::new()
        .route(
            "/api/applications",
            get(applications::list).post(applications::create),
        )
        .route("/api/applications/stage/:stage", get(applications::by_stage))
        .route(
            "/api/applications/:id",
            get(applications::get)
                .put(applications::update)
                .delete(applications::delete),
        )
}

fn follow_up_routes() -> Router {
    use protected::{activities, follow_ups};

    Router::new()
        .route("/api/followups", get(follow_ups::list).post(follow_ups::create))
        .route("/api/followups/today", get(follow_ups::today))
        .route("/api/followups/overdue", get(follow_ups::overdue))
        .route(
            "/api/followups/:id",
            get(follow_ups::get).put(follow_ups::update).delete(follow_ups::delete),
        )
        .route("/api/followups/:id/complete", patch(follow_ups::complete))
        .route("/api/activities", get(activities::list).post(activities::create))
        .route(
            "/api/activities/:id",
            get(activities::get).put(activities::update).delete(activities::delete),
        )
}

fn notification_routes() -> Router {
    use protected::notifications;

    Router::new()
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/:id", patch(notifications::mark_read))
}

fn onboarding_routes() -> Router {
    use protected::onboarding;

    Router::new()
        .route(
            "/api/onboarding-forms",
            get(onboarding::list).post(onboarding::create),
        )
        .route(
            "/api/onboarding-forms/submissions",
            get(onboarding::all_submissions),
        )
        .route(
            "/api/onboarding-forms/submissions/:submission_id/create-client",
            post(onboarding::create_client),
        )
        .route(
            "/api/onboarding-forms/:id",
            get(onboarding::get)
                .put(onboarding::update)
                .delete(onboarding::delete),
        )
        .route(
            "/api/onboarding-forms/:id/submissions",
            get(onboarding::form_submissions),
        )
}

fn rule_routes() -> Router {
    use protected::rules;

    Router::new()
        .route("/api/rules", get(rules::list).post(rules::create))
        .route("/api/rules/evaluate", post(rules::evaluate))
        .route(
            "/api/rules/:id",
            get(rules::get).put(rules::update).delete(rules::delete),
        )
        .route("/api/rules/:id/toggle", patch(rules::toggle))
}

fn analytics_routes() -> Router {
    use protected::analytics;

    Router::new()
        .route(
            "/api/analytics/recruiter-metrics",
            get(analytics::recruiter_metrics),
        )
        .route("/api/analytics/system-metrics", get(analytics::system_metrics))
        .route(
            "/api/analytics/recruiter-comparison",
            get(analytics::recruiter_comparison),
        )
}

fn admin_routes() -> Router {
    Router::new()
        .route("/api/system-health", get(protected::system_health::report))
        .route("/api/audit", get(protected::audit::list))
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Recruit ATS API",
            "version": version,
            "description": "Recruiting and applicant-tracking backend built with Rust (Axum)",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/api/auth/login, /api/auth/logout (public); /api/auth/me (protected)",
                "onboarding_public": "/api/onboarding-forms/:id/public, /api/onboarding-forms/:id/submit (public)",
                "cron": "/api/cron/followups, /api/cron/application-followups (cron secret)",
                "users": "/api/users[/:id] (admin)",
                "jobs": "/api/jobs[/:id], /api/jobs/bulk (protected)",
                "leads": "/api/leads[/:id][/documents] (protected)",
                "clients": "/api/clients[/:id] (protected)",
                "applications": "/api/applications[/:id] (protected)",
                "followups": "/api/followups (protected)",
                "notifications": "/api/notifications (protected)",
                "onboarding": "/api/onboarding-forms[/:id] (protected)",
                "rules": "/api/rules[/:id] (admin/manager)",
                "analytics": "/api/analytics/* (protected)",
                "system_health": "/api/system-health (admin)",
                "audit": "/api/audit (admin)",
            }
        }
    }))
}

async fn health() -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                    }
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let mut config = AppConfig::from_env();
        config.security.cors_origins = vec!["http://localhost:3000".to_string()];
        config.security.cron_secret = None;
        let dir = std::env::temp_dir().join("recruit-ats-router-tests");
        let store: Arc<dyn ObjectStore> = Arc::new(LocalDiskStore::new(dir, "http://localhost/files"));
        app(&config, store)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_describes_the_api() {
        let response = test_app()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["name"], "Recruit ATS API");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        for path in ["/api/jobs", "/api/auth/me", "/api/system-health", "/api/rules"] {
            let response = test_app()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", path);
            let body = body_json(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["code"], "UNAUTHORIZED");
        }
    }

    #[tokio::test]
    async fn record_routes_are_mounted_behind_auth() {
        let id = "6f1c2b1e-3c1a-4b8e-9d55-0a4de3f1c001";
        let cases = [
            (Method::PUT, format!("/api/clients/{}", id)),
            (Method::DELETE, format!("/api/clients/{}", id)),
            (Method::DELETE, format!("/api/applications/{}", id)),
            (Method::GET, "/api/applications/stage/INTERVIEW".to_string()),
            (Method::GET, "/api/followups/today".to_string()),
            (Method::GET, "/api/followups/overdue".to_string()),
            (Method::PUT, format!("/api/followups/{}", id)),
            (Method::DELETE, format!("/api/followups/{}", id)),
            (Method::POST, "/api/activities".to_string()),
            (Method::PUT, format!("/api/activities/{}", id)),
            (Method::DELETE, format!("/api/activities/{}", id)),
        ];
        for (method, path) in cases {
            let request = Request::builder()
                .method(method.clone())
                .uri(&path)
                .body(Body::empty())
                .unwrap();
            let response = test_app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, path);
        }

        let response = test_app()
            .oneshot(Request::get("/api/no-such-thing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let request = Request::get("/api/leads")
            .header(header::AUTHORIZATION, "Bearer not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn preflight_from_allowed_origin() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/jobs")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn preflight_from_unknown_origin_gets_no_cors_headers() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/jobs")
            .header(header::ORIGIN, "https://evil.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn cron_without_configured_secret_is_unauthorized() {
        let request = Request::get("/api/cron/followups")
            .header("x-cron-secret", "guess")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_with_malformed_body_is_a_client_error() {
        let request = Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INVALID_JSON");
    }

    #[tokio::test]
    async fn logout_clears_the_cookie() {
        let response = test_app()
            .oneshot(
                Request::post("/api/auth/logout")
                    .header(header::COOKIE, "token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(cookie.starts_with("token="));
    }
}
