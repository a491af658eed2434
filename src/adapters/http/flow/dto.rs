//! HTTP DTOs for flow endpoints.
//!
//! Step results and status views serialize straight from the engine types;
//! only requests and errors need their own shapes here.

use serde::{Deserialize, Serialize};

use crate::application::{FailureKind, StepFailure};

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Request to open a session for a template.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSessionRequest {
    pub template_id: String,
}

/// Request to re-point a session at a step.
#[derive(Debug, Clone, Deserialize)]
pub struct JumpRequest {
    pub step_id: String,
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Error body shared by every flow endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
            retryable: false,
            session_id: None,
        }
    }
}

impl From<&StepFailure> for ErrorResponse {
    fn from(failure: &StepFailure) -> Self {
        Self {
            code: failure_code(failure.kind).to_string(),
            message: failure.message.clone(),
            retryable: failure.retryable,
            session_id: failure.session_id.map(|id| id.to_string()),
        }
    }
}

fn failure_code(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Validation => "VALIDATION",
        FailureKind::TransientProvider => "TRANSIENT_PROVIDER",
        FailureKind::Auth => "PROVIDER_AUTH",
        FailureKind::Quota => "PROVIDER_QUOTA",
        FailureKind::ProviderRejected => "PROVIDER_REJECTED",
        FailureKind::ConcurrentExecution => "CONCURRENT_EXECUTION",
        FailureKind::SessionNotFound => "SESSION_NOT_FOUND",
        FailureKind::TemplateNotFound => "TEMPLATE_NOT_FOUND",
        FailureKind::StepNotFound => "STEP_NOT_FOUND",
        FailureKind::TerminalState => "TERMINAL_STATE",
        FailureKind::InvalidState => "INVALID_STATE",
        FailureKind::NoRemainingSteps => "NO_REMAINING_STEPS",
        FailureKind::Repository => "REPOSITORY",
        FailureKind::Internal => "INTERNAL_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::SessionId;

    #[test]
    fn open_session_request_deserializes() {
        let req: OpenSessionRequest =
            serde_json::from_str(r#"{"template_id":"product-review"}"#).unwrap();
        assert_eq!(req.template_id, "product-review");
    }

    #[test]
    fn failure_carries_retryable_flag_and_session() {
        let id = SessionId::new();
        let error = ErrorResponse::from(&StepFailure::concurrent(id));
        assert_eq!(error.code, "CONCURRENT_EXECUTION");
        assert!(error.retryable);
        assert_eq!(error.session_id, Some(id.to_string()));
    }

    #[test]
    fn bad_request_omits_session() {
        let json = serde_json::to_value(ErrorResponse::bad_request("Invalid session ID")).unwrap();
        assert_eq!(json["code"], "BAD_REQUEST");
        assert!(json.get("session_id").is_none());
    }
}
