//! Session aggregate entity.
//!
//! A session is one run of a flow template. It tracks where the run is
//! (step cursor and round) and its lifecycle status. Only the flow engine
//! mutates sessions.

use crate::domain::foundation::{
    DomainError, ErrorCode, SessionId, SessionStatus, StateMachine, TemplateId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Session aggregate - progress of one flow run.
///
/// # Invariants
///
/// - `current_round` starts at 1 and never decreases
/// - `cursor` is `None` only once the sequence has been exhausted or the
///   session reached a terminal status
/// - Completed and Failed sessions are never mutated again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for this session.
    id: SessionId,

    /// Template this session runs.
    template_id: TemplateId,

    /// Current lifecycle status.
    status: SessionStatus,

    /// Index of the next step to execute.
    cursor: Option<usize>,

    /// Current round (1-based).
    current_round: u32,

    /// Why the session failed, if it did.
    failure_reason: Option<String>,

    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Session {
    /// Create a new pending session positioned at the first step.
    pub fn new(id: SessionId, template_id: TemplateId) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            template_id,
            status: SessionStatus::Pending,
            cursor: Some(0),
            current_round: 1,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitute a session from persistence (no validation).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: SessionId,
        template_id: TemplateId,
        status: SessionStatus,
        cursor: Option<usize>,
        current_round: u32,
        failure_reason: Option<String>,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            template_id,
            status,
            cursor,
            current_round,
            failure_reason,
            created_at,
            updated_at,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Index of the next step to execute, `None` when the sequence is exhausted.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn updated_at(&self) -> &Timestamp {
        &self.updated_at
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Moves a pending session to running. No-op when already running.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if the session does not accept steps
    pub fn begin(&mut self) -> Result<(), DomainError> {
        match self.status {
            SessionStatus::Running => Ok(()),
            _ => self.transition(SessionStatus::Running),
        }
    }

    /// Pauses a running session.
    pub fn pause(&mut self) -> Result<(), DomainError> {
        if self.status != SessionStatus::Running {
            return Err(self.invalid_transition(SessionStatus::Paused));
        }
        self.transition(SessionStatus::Paused)
    }

    /// Resumes a paused session.
    pub fn resume(&mut self) -> Result<(), DomainError> {
        if self.status != SessionStatus::Paused {
            return Err(self.invalid_transition(SessionStatus::Running));
        }
        self.transition(SessionStatus::Running)
    }

    /// Marks the session completed. The cursor is cleared.
    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition(SessionStatus::Completed)?;
        self.cursor = None;
        Ok(())
    }

    /// Marks the session failed with the given reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(SessionStatus::Failed)?;
        self.cursor = None;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cursor
    // ─────────────────────────────────────────────────────────────────────────

    /// Points the cursor at `index`, bumping the round when `new_round` is set.
    pub fn advance_to(&mut self, index: usize, new_round: bool) -> Result<(), DomainError> {
        self.ensure_not_terminal()?;
        self.cursor = Some(index);
        if new_round {
            self.current_round += 1;
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    /// Records that the sequence ran out of steps without completing.
    pub fn exhaust(&mut self) -> Result<(), DomainError> {
        self.ensure_not_terminal()?;
        self.cursor = None;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn transition(&mut self, target: SessionStatus) -> Result<(), DomainError> {
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| self.invalid_transition(target))?;
        self.updated_at = Timestamp::now();
        Ok(())
    }

    fn invalid_transition(&self, target: SessionStatus) -> DomainError {
        DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!("Cannot move session from {} to {}", self.status, target),
        )
        .with_detail("session_id", self.id.to_string())
    }

    fn ensure_not_terminal(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Session is {}", self.status),
            ))
        } else {
            Ok(())
        }
    }
}
