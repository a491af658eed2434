//! Flow engine - advances sessions one step at a time.
//!
//! # Step pipeline
//!
//! ```text
//! lock session -> load step -> resolve role -> resolve context
//!   -> retrieve excerpts (optional) -> assemble prompt
//!   -> record STARTED -> invoke provider -> record COMPLETED
//!   -> commit message + cursor -> record FINALIZED -> unlock
//! ```
//!
//! The engine is the only component that changes session status. Each step
//! runs on its own task holding the session lock, so a caller that stops
//! waiting does not cancel a provider call already in flight.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::failure::{FailureKind, StepFailure};
use super::llm_invoker::{InvocationOutcome, LlmInvoker};
use super::session_locks::{SessionGuard, SessionLocks};
use crate::domain::context::{ContextFragment, ContextResolver};
use crate::domain::flow::{CompletionFacts, FlowStep, FlowTemplate, Transition};
use crate::domain::foundation::{
    InteractionId, RoleName, SessionId, SessionStatus, StateMachine, StepId, TemplateId,
    ValidationError,
};
use crate::domain::interaction::{InteractionRecord, PerformanceMetrics};
use crate::domain::prompt::{PromptAssembler, RetrievedExcerpt};
use crate::domain::session::{Message, MessageFilter, Session};
use crate::ports::{
    InteractionRecorder, KnowledgeRetriever, RequestMetadata, RetrievalQuery, RoleRepository,
    SessionRepository, TemplateRepository,
};

/// Default time allowed for knowledge retrieval before giving up on it.
pub const DEFAULT_RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(3);

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowEngineConfig {
    pub retrieval_timeout: Duration,
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self {
            retrieval_timeout: DEFAULT_RETRIEVAL_TIMEOUT,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Results
// ════════════════════════════════════════════════════════════════════════════════

/// Result of a successful `execute_step`.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub message: Message,
    pub debug: StepDebugInfo,
    /// Session status after the step.
    pub status: SessionStatus,
    pub next_step_index: Option<usize>,
    pub current_round: u32,
}

/// Diagnostics for one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepDebugInfo {
    pub role_name: RoleName,
    pub step_id: StepId,
    pub task_type: String,
    pub context_fragments_used: Vec<ContextFragment>,
    pub retrieval_excerpts_used: usize,
    pub timing: StepTiming,
    pub retry_count: u32,
    pub interaction_id: InteractionId,
}

/// Timing of one executed step, in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub total_ms: u64,
    pub provider_ms: u64,
    pub attempt_ms: Vec<u64>,
}

/// Read-only view of a session's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionStatus {
    pub session_id: SessionId,
    pub template_id: TemplateId,
    pub status: SessionStatus,
    pub current_step_index: Option<usize>,
    pub current_step_id: Option<StepId>,
    pub total_steps: usize,
    pub current_round: u32,
    pub failure_reason: Option<String>,
    /// A step or intervention currently holds the session.
    pub in_flight: bool,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ════════════════════════════════════════════════════════════════════════════════
// Engine
// ════════════════════════════════════════════════════════════════════════════════

/// Orchestrates step execution for flow sessions.
#[derive(Clone)]
pub struct FlowEngine {
    sessions: Arc<dyn SessionRepository>,
    templates: Arc<dyn TemplateRepository>,
    roles: Arc<dyn RoleRepository>,
    invoker: LlmInvoker,
    recorder: Arc<dyn InteractionRecorder>,
    retriever: Option<Arc<dyn KnowledgeRetriever>>,
    locks: SessionLocks,
    config: FlowEngineConfig,
}

impl FlowEngine {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        templates: Arc<dyn TemplateRepository>,
        roles: Arc<dyn RoleRepository>,
        invoker: LlmInvoker,
        recorder: Arc<dyn InteractionRecorder>,
    ) -> Self {
        Self {
            sessions,
            templates,
            roles,
            invoker,
            recorder,
            retriever: None,
            locks: SessionLocks::new(),
            config: FlowEngineConfig::default(),
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_config(mut self, config: FlowEngineConfig) -> Self {
        self.config = config;
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Core operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Advances the session by exactly one step.
    ///
    /// Returns `ConcurrentExecution` immediately if the session is busy.
    #[tracing::instrument(name = "execute_step", skip_all, fields(session_id = %session_id))]
    pub async fn execute_step(&self, session_id: SessionId) -> Result<StepOutcome, StepFailure> {
        let guard = self
            .locks
            .try_acquire(session_id)
            .ok_or_else(|| StepFailure::concurrent(session_id))?;

        let engine = self.clone();
        let task = tokio::spawn(async move { engine.run_step(guard).await });

        task.await.map_err(|err| {
            tracing::error!(error = %err, "step task did not complete");
            StepFailure::new(FailureKind::Internal, "step task did not complete")
                .for_session(session_id)
        })?
    }

    /// Current progress of a session. Never waits on in-flight work.
    pub async fn execution_status(
        &self,
        session_id: SessionId,
    ) -> Result<ExecutionStatus, StepFailure> {
        let session = self.load_session(session_id).await?;
        let template = self.load_template(session.template_id()).await?;
        Ok(self.status_of(&session, &template))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operator interventions
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a PENDING session for a template.
    pub async fn open_session(&self, template_id: &TemplateId) -> Result<ExecutionStatus, StepFailure> {
        let template = self.load_template(template_id).await?;
        let session = Session::new(SessionId::new(), template_id.clone());
        self.sessions.save(&session).await?;
        tracing::info!(session_id = %session.id(), template_id = %template_id, "session opened");
        Ok(self.status_of(&session, &template))
    }

    /// RUNNING -> PAUSED.
    pub async fn pause(&self, session_id: SessionId) -> Result<ExecutionStatus, StepFailure> {
        self.intervene(session_id, "pause", |session, _| session.pause().map_err(Into::into))
            .await
    }

    /// PAUSED -> RUNNING.
    pub async fn resume(&self, session_id: SessionId) -> Result<ExecutionStatus, StepFailure> {
        self.intervene(session_id, "resume", |session, _| session.resume().map_err(Into::into))
            .await
    }

    /// Re-points an idle session at `step_id`.
    ///
    /// Jumping to a step that does not come after the last one starts a new round.
    pub async fn jump_to(
        &self,
        session_id: SessionId,
        step_id: StepId,
    ) -> Result<ExecutionStatus, StepFailure> {
        self.intervene(session_id, "jump", move |session, template| {
            let target = template.index_of(&step_id).ok_or_else(|| {
                StepFailure::new(
                    FailureKind::StepNotFound,
                    format!("template has no step '{}'", step_id),
                )
            })?;
            let from = session
                .cursor()
                .or_else(|| template.total_steps().checked_sub(1));
            let new_round = template.starts_new_round(from, target);
            session.advance_to(target, new_round).map_err(Into::into)
        })
        .await
    }

    async fn intervene<F>(
        &self,
        session_id: SessionId,
        action: &'static str,
        apply: F,
    ) -> Result<ExecutionStatus, StepFailure>
    where
        F: FnOnce(&mut Session, &FlowTemplate) -> Result<(), StepFailure>,
    {
        let _guard = self
            .locks
            .try_acquire(session_id)
            .ok_or_else(|| StepFailure::concurrent(session_id))?;

        let mut session = self.load_session(session_id).await?;
        if session.status().is_terminal() {
            return Err(terminal(&session));
        }
        let template = self.load_template(session.template_id()).await?;

        apply(&mut session, template.as_ref()).map_err(|f| f.for_session(session_id))?;
        self.sessions.update(&session).await?;

        tracing::info!(
            session_id = %session_id,
            action,
            status = %session.status(),
            cursor = ?session.cursor(),
            round = session.current_round(),
            "session intervention applied"
        );
        Ok(self.status_of(&session, &template))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Step pipeline
    // ─────────────────────────────────────────────────────────────────────────

    async fn run_step(&self, guard: SessionGuard) -> Result<StepOutcome, StepFailure> {
        let session_id = *guard.session_id();
        let started = Instant::now();

        let mut session = self.load_session(session_id).await?;
        match session.status() {
            status if status.is_terminal() => return Err(terminal(&session)),
            SessionStatus::Paused => {
                return Err(StepFailure::new(
                    FailureKind::InvalidState,
                    "session is paused; resume it first",
                )
                .for_session(session_id))
            }
            _ => {}
        }

        let template = self.load_template(session.template_id()).await?;
        let Some(index) = session.cursor() else {
            return Err(StepFailure::new(
                FailureKind::NoRemainingSteps,
                "no remaining steps; jump to a step or stop the session",
            )
            .for_session(session_id));
        };

        session.begin()?;

        let Some(step) = template.step(index).cloned() else {
            let reason = format!("cursor {} is outside the template", index);
            return Err(self.fail_session(&mut session, FailureKind::Validation, reason).await);
        };

        let role = match self.roles.find(&step.speaker).await? {
            Some(role) => role,
            None => {
                let err = ValidationError::UnknownRole(step.speaker.to_string());
                return Err(self.fail_validation(&mut session, err).await);
            }
        };
        if let Some(target) = &step.target {
            if self.roles.find(target).await?.is_none() {
                let err = ValidationError::UnknownRole(target.to_string());
                return Err(self.fail_validation(&mut session, err).await);
            }
        }

        let history = self
            .sessions
            .messages(&session_id, &MessageFilter::default())
            .await?;

        let fragments = match ContextResolver::resolve(
            &history,
            &step.context_scope,
            &step.context_param,
            session.current_round(),
        ) {
            Ok(fragments) => fragments,
            Err(err) => return Err(self.fail_validation(&mut session, err).await),
        };

        let excerpts = self.retrieve(&step, &fragments).await;

        let prompt = match PromptAssembler::assemble(&role, &step, &fragments, &excerpts) {
            Ok(prompt) => prompt,
            Err(err) => return Err(self.fail_validation(&mut session, err).await),
        };

        let mut record = InteractionRecord::started(
            session_id,
            step.speaker.clone(),
            step.id.clone(),
            session.current_round(),
            prompt.text.clone(),
        );
        self.record(&record).await;

        let metadata = RequestMetadata {
            session_id,
            step_id: step.id.clone(),
            trace_id: record.id.to_string(),
        };
        let outcome = match self.invoker.invoke(&prompt.text, Some(metadata)).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let metrics = PerformanceMetrics::new(
                    err.total_duration(),
                    err.attempts(),
                    prompt.text.chars().count(),
                    0,
                );
                record.complete_failure(err.to_string(), metrics);
                self.record(&record).await;

                let failure = StepFailure::from(&err);
                return Err(self.fail_session(&mut session, failure.kind, failure.message).await);
            }
        };

        record.complete_success(outcome.content.clone(), metrics_of(&outcome));
        self.record(&record).await;

        let message = Message::new(
            session_id,
            step.id.clone(),
            session.current_round(),
            step.speaker.clone(),
            step.target.clone(),
            outcome.content.clone(),
        );

        self.apply_transition(&mut session, &template, index, history.len() + 1)?;
        self.sessions.commit_step(&session, &message).await?;

        record.finalize(*message.id());
        self.record(&record).await;

        tracing::info!(
            step_id = %step.id,
            role = %step.speaker,
            attempts = outcome.attempts,
            status = %session.status(),
            next = ?session.cursor(),
            round = session.current_round(),
            duration_ms = millis(started.elapsed()),
            "step executed"
        );

        Ok(StepOutcome {
            debug: StepDebugInfo {
                role_name: step.speaker.clone(),
                step_id: step.id.clone(),
                task_type: prompt.task_type.to_string(),
                context_fragments_used: fragments,
                retrieval_excerpts_used: excerpts.len(),
                timing: StepTiming {
                    total_ms: millis(started.elapsed()),
                    provider_ms: millis(outcome.total_duration),
                    attempt_ms: outcome.attempt_durations.iter().copied().map(millis).collect(),
                },
                retry_count: outcome.attempts.saturating_sub(1),
                interaction_id: record.id,
            },
            message,
            status: session.status(),
            next_step_index: session.cursor(),
            current_round: session.current_round(),
        })
    }

    /// Explicit override, then sequential order, then the completion predicate.
    fn apply_transition(
        &self,
        session: &mut Session,
        template: &FlowTemplate,
        index: usize,
        message_count: usize,
    ) -> Result<(), StepFailure> {
        match template.transition_from(index) {
            Transition::Advance { index, new_round } => session.advance_to(index, new_round)?,
            Transition::EndOfSequence => {
                let facts = CompletionFacts {
                    current_round: session.current_round(),
                    message_count,
                };
                if template.completion().is_satisfied(&facts) {
                    session.complete()?;
                } else {
                    tracing::info!(
                        session_id = %session.id(),
                        predicate = %template.completion(),
                        "sequence exhausted without completion; awaiting intervention"
                    );
                    session.exhaust()?;
                }
            }
        }
        Ok(())
    }

    /// Fetches excerpts for steps that ask for them. Any failure means none.
    async fn retrieve(&self, step: &FlowStep, fragments: &[ContextFragment]) -> Vec<RetrievedExcerpt> {
        let (Some(retriever), Some(config)) = (&self.retriever, &step.retrieval) else {
            return Vec::new();
        };

        let query = config
            .query
            .clone()
            .or_else(|| fragments.last().map(|f| f.content.clone()))
            .unwrap_or_else(|| step.description.clone());
        if query.trim().is_empty() {
            return Vec::new();
        }

        let request = RetrievalQuery {
            dataset_ids: config.dataset_ids.clone(),
            query,
            top_k: config.top_k,
            min_score: config.min_score,
        };

        match tokio::time::timeout(self.config.retrieval_timeout, retriever.retrieve(&request)).await
        {
            Ok(Ok(mut excerpts)) => {
                if let Some(min) = config.min_score {
                    excerpts.retain(|e| e.score >= min);
                }
                excerpts.truncate(config.top_k);
                excerpts
            }
            Ok(Err(err)) => {
                tracing::warn!(step_id = %step.id, error = %err, "retrieval failed; continuing without excerpts");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    step_id = %step.id,
                    timeout_ms = millis(self.config.retrieval_timeout),
                    "retrieval timed out; continuing without excerpts"
                );
                Vec::new()
            }
        }
    }

    /// Writes one record stage. Failures are logged and dropped.
    async fn record(&self, record: &InteractionRecord) {
        if let Err(err) = self.recorder.record(record).await {
            tracing::warn!(
                interaction_id = %record.id,
                stage = ?record.stage,
                error = %err,
                "interaction record write failed"
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn load_session(&self, session_id: SessionId) -> Result<Session, StepFailure> {
        self.sessions
            .find_by_id(&session_id)
            .await?
            .ok_or_else(|| StepFailure::not_found(session_id))
    }

    async fn load_template(&self, template_id: &TemplateId) -> Result<Arc<FlowTemplate>, StepFailure> {
        self.templates.find(template_id).await?.ok_or_else(|| {
            StepFailure::new(
                FailureKind::TemplateNotFound,
                format!("template '{}' not found", template_id),
            )
        })
    }

    async fn fail_validation(&self, session: &mut Session, err: ValidationError) -> StepFailure {
        self.fail_session(session, FailureKind::Validation, err.to_string())
            .await
    }

    /// Moves the session to FAILED and persists it.
    async fn fail_session(
        &self,
        session: &mut Session,
        kind: FailureKind,
        reason: String,
    ) -> StepFailure {
        let failure = StepFailure::new(kind, reason).for_session(*session.id());

        if let Err(err) = session.fail(failure.message.clone()) {
            tracing::error!(session_id = %session.id(), error = %err, "could not fail session");
            return failure;
        }
        if let Err(err) = self.sessions.update(session).await {
            tracing::error!(session_id = %session.id(), error = %err, "could not persist failed session");
        }
        tracing::warn!(
            session_id = %session.id(),
            kind = ?failure.kind,
            reason = %failure.message,
            "session failed"
        );
        failure
    }

    fn status_of(&self, session: &Session, template: &FlowTemplate) -> ExecutionStatus {
        ExecutionStatus {
            session_id: *session.id(),
            template_id: session.template_id().clone(),
            status: session.status(),
            current_step_index: session.cursor(),
            current_step_id: session
                .cursor()
                .and_then(|i| template.step(i))
                .map(|s| s.id.clone()),
            total_steps: template.total_steps(),
            current_round: session.current_round(),
            failure_reason: session.failure_reason().map(str::to_string),
            in_flight: self.locks.is_held(session.id()),
        }
    }
}

fn terminal(session: &Session) -> StepFailure {
    StepFailure::new(
        FailureKind::TerminalState,
        format!("session is {}", session.status()),
    )
    .for_session(*session.id())
}

fn metrics_of(outcome: &InvocationOutcome) -> PerformanceMetrics {
    PerformanceMetrics::new(
        outcome.total_duration,
        outcome.attempts,
        outcome.prompt_chars,
        outcome.response_chars,
    )
}
