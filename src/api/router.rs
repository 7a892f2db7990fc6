//! API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//! Everything except `/api/health` requires a principal.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // Extension must be outermost so the principal middleware can reach ApiContext.
    let protected = Router::new()
        .route(
            "/documents",
            get(endpoints::documents::list).post(endpoints::documents::upload),
        )
        .route(
            "/documents/:id",
            get(endpoints::documents::detail).delete(endpoints::documents::remove),
        )
        .route("/documents/:id/versions", get(endpoints::documents::versions))
        .route(
            "/documents/:id/current-version",
            put(endpoints::documents::set_current),
        )
        .route("/documents/:id/status", post(endpoints::documents::change_status))
        .route(
            "/documents/:id/suggestions",
            get(endpoints::suggestions::list).post(endpoints::suggestions::suggest),
        )
        .route("/batch/suggestions", post(endpoints::suggestions::run_batch))
        .route(
            "/batch/suggestions/cancel",
            post(endpoints::suggestions::cancel_batch),
        )
        .route("/search", post(endpoints::search::search))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::principal::require_principal))
        .layer(axum::Extension(ctx.clone()));

    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", protected.merge(unprotected))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::middleware::principal::{PRINCIPAL_ID_HEADER, PRINCIPAL_ROLES_HEADER};
    use crate::core_state::tests::test_core;

    fn app() -> (Router, Arc<CoreState>) {
        let core = Arc::new(test_core());
        (api_router(core.clone()), core)
    }

    fn request(method: &str, uri: &str, roles: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(roles) = roles {
            builder = builder
                .header(PRINCIPAL_ID_HEADER, "tester")
                .header(PRINCIPAL_ROLES_HEADER, roles);
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn upload_body(text: &str) -> Value {
        json!({
            "file_name": "policy.txt",
            "content": base64::engine::general_purpose::STANDARD.encode(text),
        })
    }

    async fn create_document(app: &Router) -> String {
        let (status, doc) = send(
            app,
            request("POST", "/api/documents", Some("submitter"), Some(upload_body("Rotate passwords."))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        doc["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_needs_no_principal() {
        let (app, core) = app();
        let (status, json) = send(&app, request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        core.shutdown();
    }

    #[tokio::test]
    async fn protected_routes_require_principal() {
        let (app, core) = app();
        let (status, json) = send(&app, request("GET", "/api/documents", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "PRINCIPAL_REQUIRED");
        core.shutdown();
    }

    #[tokio::test]
    async fn upload_then_read_versions() {
        let (app, core) = app();
        let id = create_document(&app).await;

        let mut second = upload_body("Rotate passwords every 90 days.");
        second["document_id"] = json!(id);
        second["change_description"] = json!("tightened");
        let (status, doc) = send(
            &app,
            request("POST", "/api/documents", Some("submitter"), Some(second)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["media_type"], "text/plain");

        let (status, versions) = send(
            &app,
            request("GET", &format!("/api/documents/{id}/versions"), Some("viewer"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(versions[0]["version_number"], 2);
        assert_eq!(versions[0]["change_description"], "tightened");
        assert_eq!(versions[1]["version_number"], 1);

        let v1 = versions[1]["id"].as_str().unwrap();
        let (status, doc) = send(
            &app,
            request(
                "PUT",
                &format!("/api/documents/{id}/current-version"),
                Some("submitter"),
                Some(json!({ "version_id": v1 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["current_version_id"], v1);
        core.shutdown();
    }

    #[tokio::test]
    async fn workflow_errors_map_to_http() {
        let (app, core) = app();
        let id = create_document(&app).await;
        let uri = format!("/api/documents/{id}/status");

        let (status, json) = send(
            &app,
            request("POST", &uri, Some("reviewer"), Some(json!({ "status": "approved" }))),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "INVALID_TRANSITION");

        let (status, _) = send(
            &app,
            request("POST", &uri, Some("reviewer"), Some(json!({ "status": "inReview" }))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, doc) = send(
            &app,
            request("POST", &uri, Some("submitter"), Some(json!({ "status": "inReview" }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["status"], "in_review");
        assert_eq!(doc["status_changed_by"], "tester");
        core.shutdown();
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids() {
        let (app, core) = app();
        let (status, _) = send(
            &app,
            request("GET", &format!("/api/documents/{}", uuid::Uuid::new_v4()), Some("admin"), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, request("GET", "/api/documents/xyz", Some("admin"), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        core.shutdown();
    }

    #[tokio::test]
    async fn suggest_and_list_suggestions() {
        let (app, core) = app();
        let id = create_document(&app).await;
        let uri = format!("/api/documents/{id}/suggestions");

        let (status, report) = send(&app, request("POST", &uri, Some("submitter"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["rule_counts"]["created"], 1);

        let (status, stored) = send(&app, request("GET", &uri, Some("viewer"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored["rules"][0]["name"], "Password Rotation");
        assert_eq!(stored["risks"][0]["impact"], "high");
        core.shutdown();
    }

    #[tokio::test]
    async fn batch_requires_admin_and_validates_statuses() {
        let (app, core) = app();
        create_document(&app).await;

        let (status, _) = send(
            &app,
            request("POST", "/api/batch/suggestions", Some("submitter"), Some(json!({}))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/batch/suggestions",
                Some("admin"),
                Some(json!({ "statuses": ["archived"] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, summary) = send(
            &app,
            request(
                "POST",
                "/api/batch/suggestions",
                Some("admin"),
                Some(json!({ "statuses": ["draft"] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["rules_processed"], 1);
        assert_eq!(summary["errors_count"], 0);
        core.shutdown();
    }

    #[tokio::test]
    async fn search_validates_query() {
        let (app, core) = app();
        let (status, _) = send(
            &app,
            request("POST", "/api/search", Some("viewer"), Some(json!({ "query": " ", "top_k": 5 }))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, hits) = send(
            &app,
            request("POST", "/api/search", Some("viewer"), Some(json!({ "query": "passwords", "top_k": 5 }))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(hits.is_array());
        core.shutdown();
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let (app, core) = app();
        let id = create_document(&app).await;
        let uri = format!("/api/documents/{id}");

        let (status, _) = send(&app, request("DELETE", &uri, Some("viewer"), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, request("DELETE", &uri, Some("submitter"), None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, request("GET", &uri, Some("admin"), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        core.shutdown();
    }
}
