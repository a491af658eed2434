//! Structured failures returned by the flow engine.

use serde::{Deserialize, Serialize};

use super::llm_invoker::InvocationError;
use crate::domain::foundation::{DomainError, ErrorCode, SessionId, ValidationError};

/// Category of a step or intervention failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed step definition. The session has been failed.
    Validation,
    /// Provider retries exhausted. The session has been failed.
    TransientProvider,
    /// Provider rejected credentials. The session has been failed.
    Auth,
    /// Provider quota exhausted. The session has been failed.
    Quota,
    /// Provider refused the request as malformed. The session has been failed.
    ProviderRejected,
    /// Another operation holds the session. Nothing was changed.
    ConcurrentExecution,
    SessionNotFound,
    TemplateNotFound,
    /// A jump named a step the template does not define.
    StepNotFound,
    /// The session is COMPLETED or FAILED.
    TerminalState,
    /// The operation is not allowed in the session's current status.
    InvalidState,
    /// The sequence is exhausted; an operator must jump or stop.
    NoRemainingSteps,
    /// Storage failure.
    Repository,
    /// The step task ended without producing a result.
    Internal,
}

impl FailureKind {
    /// Whether the caller may retry the same call later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::ConcurrentExecution | FailureKind::Repository
        )
    }

    /// Whether this failure moved the session to FAILED.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FailureKind::Validation
                | FailureKind::TransientProvider
                | FailureKind::Auth
                | FailureKind::Quota
                | FailureKind::ProviderRejected
        )
    }
}

/// Failure object surfaced to callers. Never carries a raw provider error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl StepFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            session_id: None,
        }
    }

    pub fn for_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn concurrent(session_id: SessionId) -> Self {
        Self::new(
            FailureKind::ConcurrentExecution,
            "a step is already executing for this session",
        )
        .for_session(session_id)
    }

    pub fn not_found(session_id: SessionId) -> Self {
        Self::new(FailureKind::SessionNotFound, "session not found").for_session(session_id)
    }
}

impl From<ValidationError> for StepFailure {
    fn from(err: ValidationError) -> Self {
        StepFailure::new(FailureKind::Validation, err.to_string())
    }
}

impl From<&InvocationError> for StepFailure {
    fn from(err: &InvocationError) -> Self {
        let kind = match err {
            InvocationError::TransientExhausted { .. } => FailureKind::TransientProvider,
            InvocationError::Auth { .. } => FailureKind::Auth,
            InvocationError::Quota { .. } => FailureKind::Quota,
            InvocationError::Rejected { .. } => FailureKind::ProviderRejected,
        };
        StepFailure::new(kind, err.to_string())
    }
}

impl From<DomainError> for StepFailure {
    fn from(err: DomainError) -> Self {
        let kind = match err.code {
            ErrorCode::SessionNotFound => FailureKind::SessionNotFound,
            ErrorCode::TemplateNotFound => FailureKind::TemplateNotFound,
            ErrorCode::RoleNotFound | ErrorCode::ValidationFailed => FailureKind::Validation,
            ErrorCode::InvalidStateTransition => FailureKind::InvalidState,
            ErrorCode::DuplicateMessage
            | ErrorCode::DatabaseError
            | ErrorCode::StorageError
            | ErrorCode::InternalError => FailureKind::Repository,
        };
        StepFailure::new(kind, err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProviderError;
    use std::time::Duration;

    #[test]
    fn only_concurrency_and_storage_are_retryable() {
        assert!(StepFailure::concurrent(SessionId::new()).retryable);
        assert!(!StepFailure::new(FailureKind::Validation, "x").retryable);
        assert!(!StepFailure::new(FailureKind::TransientProvider, "x").retryable);
        assert!(StepFailure::new(FailureKind::Repository, "x").retryable);
    }

    #[test]
    fn invocation_errors_map_to_distinct_kinds() {
        let exhausted = InvocationError::TransientExhausted {
            last: ProviderError::server("503"),
            attempts: 3,
            total_duration: Duration::from_millis(10),
        };
        let auth = InvocationError::Auth {
            error: ProviderError::authentication("bad key"),
            attempts: 1,
            total_duration: Duration::ZERO,
        };
        assert_eq!(StepFailure::from(&exhausted).kind, FailureKind::TransientProvider);
        assert_eq!(StepFailure::from(&auth).kind, FailureKind::Auth);
    }

    #[test]
    fn validation_error_is_fatal() {
        let failure = StepFailure::from(ValidationError::UnknownTaskType("dance".into()));
        assert_eq!(failure.kind, FailureKind::Validation);
        assert!(failure.kind.is_fatal());
        assert!(failure.message.contains("dance"));
    }

    #[test]
    fn serializes_kind_in_snake_case() {
        let json = serde_json::to_value(StepFailure::concurrent(SessionId::new())).unwrap();
        assert_eq!(json["kind"], "concurrent_execution");
        assert_eq!(json["retryable"], true);
    }
}
