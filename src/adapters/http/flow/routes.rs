//! Route configuration for flow session endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{
    execute_step, execution_status, jump_to_step, open_session, pause_session, resume_session,
    FlowAppState,
};

/// Creates the flow router with all endpoints.
///
/// Routes:
/// - `POST /api/sessions` - Open a session for a template
/// - `POST /api/sessions/:id/steps` - Execute the next step
/// - `GET /api/sessions/:id/status` - Read execution progress
/// - `POST /api/sessions/:id/pause` - Pause a running session
/// - `POST /api/sessions/:id/resume` - Resume a paused session
/// - `POST /api/sessions/:id/jump` - Re-point a session at a step
pub fn flow_router() -> Router<FlowAppState> {
    Router::new()
        .route("/api/sessions", post(open_session))
        .route("/api/sessions/:id/steps", post(execute_step))
        .route("/api/sessions/:id/status", get(execution_status))
        .route("/api/sessions/:id/pause", post(pause_session))
        .route("/api/sessions/:id/resume", post(resume_session))
        .route("/api/sessions/:id/jump", post(jump_to_step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{MockError, MockLlmProvider};
    use crate::adapters::memory::{
        InMemoryInteractionRecorder, InMemoryRoleRepository, InMemorySessionRepository,
        InMemoryTemplateRepository,
    };
    use crate::application::{FlowEngine, LlmInvoker, RetryPolicy};
    use crate::domain::flow::{CompletionPredicate, FlowStep, FlowTemplate, RoleProfile};
    use crate::domain::foundation::{RoleName, StepId, TemplateId};
    use axum::body::Body;
    use http::{header, Method, Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    // ───────────────────────────────────────────────────────────────
    // Test app
    // ───────────────────────────────────────────────────────────────

    fn role(name: &str) -> RoleName {
        RoleName::new(name).unwrap()
    }

    fn app(provider: MockLlmProvider) -> Router {
        let template = FlowTemplate::new(
            TemplateId::new("debate").unwrap(),
            "Debate",
            vec![
                FlowStep::new(StepId::new("open").unwrap(), 1, role("host"), "introduce"),
                FlowStep::new(StepId::new("argue").unwrap(), 2, role("guest"), "respond")
                    .with_target(role("host")),
            ],
            CompletionPredicate::Always,
        )
        .unwrap();
        let roles = InMemoryRoleRepository::with_roles([
            RoleProfile::new(role("host"), "You chair the debate.").unwrap(),
            RoleProfile::new(role("guest"), "You argue the motion.").unwrap(),
        ]);
        let policy = RetryPolicy::default()
            .with_max_attempts(1)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(1));

        let engine = FlowEngine::new(
            Arc::new(InMemorySessionRepository::new()),
            Arc::new(InMemoryTemplateRepository::with_templates([template])),
            Arc::new(roles),
            LlmInvoker::new(Arc::new(provider), policy),
            Arc::new(InMemoryInteractionRecorder::new()),
        );
        flow_router().with_state(FlowAppState::new(engine))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn open(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(post_json("/api/sessions", serde_json::json!({"template_id": "debate"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "PENDING");
        body["session_id"].as_str().unwrap().to_string()
    }

    // ───────────────────────────────────────────────────────────────
    // Tests
    // ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn open_step_and_read_status() {
        let app = app(MockLlmProvider::new().with_response("Welcome, everyone."));
        let id = open(&app).await;

        let response = app
            .clone()
            .oneshot(post(&format!("/api/sessions/{}/steps", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let outcome = json_body(response).await;
        assert_eq!(outcome["message"]["content"], "Welcome, everyone.");
        assert_eq!(outcome["debug"]["role_name"], "host");
        assert_eq!(outcome["next_step_index"], 1);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{}/status", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = json_body(response).await;
        assert_eq!(status["status"], "RUNNING");
        assert_eq!(status["current_step_id"], "argue");
        assert_eq!(status["total_steps"], 2);
    }

    #[tokio::test]
    async fn unknown_template_is_404() {
        let response = app(MockLlmProvider::new())
            .oneshot(post_json("/api/sessions", serde_json::json!({"template_id": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "TEMPLATE_NOT_FOUND");
    }

    #[tokio::test]
    async fn malformed_session_id_is_400() {
        let response = app(MockLlmProvider::new())
            .oneshot(post("/api/sessions/abc/steps"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn provider_auth_failure_is_502_and_fails_session() {
        let app = app(MockLlmProvider::new().with_error(MockError::AuthenticationFailed));
        let id = open(&app).await;

        let response = app
            .clone()
            .oneshot(post(&format!("/api/sessions/{}/steps", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["code"], "PROVIDER_AUTH");
        assert_eq!(body["retryable"], false);

        let response = app
            .oneshot(post(&format!("/api/sessions/{}/steps", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["code"], "TERMINAL_STATE");
    }

    #[tokio::test]
    async fn pause_resume_and_jump() {
        let app = app(MockLlmProvider::new());
        let id = open(&app).await;
        app.clone()
            .oneshot(post(&format!("/api/sessions/{}/steps", id)))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post(&format!("/api/sessions/{}/pause", id)))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "PAUSED");

        let response = app
            .clone()
            .oneshot(post(&format!("/api/sessions/{}/steps", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(post(&format!("/api/sessions/{}/resume", id)))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "RUNNING");

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/api/sessions/{}/jump", id),
                serde_json::json!({"step_id": "open"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let status = json_body(response).await;
        assert_eq!(status["current_step_id"], "open");
        assert_eq!(status["current_round"], 2);

        let response = app
            .oneshot(post_json(
                &format!("/api/sessions/{}/jump", id),
                serde_json::json!({"step_id": "closing"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
