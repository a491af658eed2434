//! HTTP handlers for flow session endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::{FailureKind, FlowEngine, StepFailure};
use crate::domain::foundation::{SessionId, StepId, TemplateId};

use super::dto::{ErrorResponse, JumpRequest, OpenSessionRequest};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct FlowAppState {
    pub engine: FlowEngine,
}

impl FlowAppState {
    pub fn new(engine: FlowEngine) -> Self {
        Self { engine }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/sessions - Open a session for a template
pub async fn open_session(
    State(state): State<FlowAppState>,
    Json(req): Json<OpenSessionRequest>,
) -> Response {
    let template_id = match TemplateId::new(req.template_id) {
        Ok(id) => id,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.engine.open_session(&template_id).await {
        Ok(status) => (StatusCode::CREATED, Json(status)).into_response(),
        Err(e) => handle_step_failure(e),
    }
}

/// POST /api/sessions/:id/steps - Execute the next step
pub async fn execute_step(
    State(state): State<FlowAppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.engine.execute_step(session_id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => handle_step_failure(e),
    }
}

/// GET /api/sessions/:id/status - Read execution progress
pub async fn execution_status(
    State(state): State<FlowAppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.engine.execution_status(session_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => handle_step_failure(e),
    }
}

/// POST /api/sessions/:id/pause - Pause a running session
pub async fn pause_session(
    State(state): State<FlowAppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.engine.pause(session_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => handle_step_failure(e),
    }
}

/// POST /api/sessions/:id/resume - Resume a paused session
pub async fn resume_session(
    State(state): State<FlowAppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.engine.resume(session_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => handle_step_failure(e),
    }
}

/// POST /api/sessions/:id/jump - Re-point a session at a step
pub async fn jump_to_step(
    State(state): State<FlowAppState>,
    Path(session_id): Path<String>,
    Json(req): Json<JumpRequest>,
) -> Response {
    let session_id = match parse_session_id(&session_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let step_id = match StepId::new(req.step_id) {
        Ok(id) => id,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.engine.jump_to(session_id, step_id).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => handle_step_failure(e),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Error handling
// ════════════════════════════════════════════════════════════════════════════

fn parse_session_id(raw: &str) -> Result<SessionId, Response> {
    raw.parse::<SessionId>()
        .map_err(|_| bad_request("Invalid session ID"))
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::bad_request(message)),
    )
        .into_response()
}

pub(crate) fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::SessionNotFound | FailureKind::TemplateNotFound | FailureKind::StepNotFound => {
            StatusCode::NOT_FOUND
        }
        FailureKind::ConcurrentExecution
        | FailureKind::TerminalState
        | FailureKind::InvalidState
        | FailureKind::NoRemainingSteps => StatusCode::CONFLICT,
        FailureKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::TransientProvider
        | FailureKind::Auth
        | FailureKind::Quota
        | FailureKind::ProviderRejected => StatusCode::BAD_GATEWAY,
        FailureKind::Repository | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn handle_step_failure(failure: StepFailure) -> Response {
    let status = status_for(failure.kind);
    if status.is_server_error() {
        tracing::warn!(kind = ?failure.kind, message = %failure.message, "flow request failed");
    }
    (status, Json(ErrorResponse::from(&failure))).into_response()
}
