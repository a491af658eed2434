//! Interaction audit records.
//!
//! Each step execution produces one record that moves through three stages:
//! written before the provider call, after it returns, and after the
//! resulting message is persisted. Every stage write carries the full record
//! so a reader can fold the log by id and keep the most advanced copy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::foundation::{
    InteractionId, MessageId, RoleName, SessionId, StepId, Timestamp,
};

/// How far a record has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionStage {
    Started,
    Completed,
    Finalized,
}

/// Size and timing of a provider interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub duration_ms: u64,
    pub attempts: u32,
    pub prompt_chars: usize,
    pub response_chars: usize,
}

impl PerformanceMetrics {
    pub fn new(duration: Duration, attempts: u32, prompt_chars: usize, response_chars: usize) -> Self {
        Self {
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            attempts,
            prompt_chars,
            response_chars,
        }
    }
}

/// Which retention horizon applies to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionClass {
    Success,
    Failure,
}

/// Durable audit entry for one step's provider interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: InteractionId,
    pub session_id: SessionId,
    pub message_id: Option<MessageId>,
    pub role_name: RoleName,
    pub step_id: StepId,
    pub round_index: u32,
    pub prompt: String,
    pub response: String,
    pub success: bool,
    pub error: Option<String>,
    pub metrics: PerformanceMetrics,
    pub stage: InteractionStage,
    pub started_at: Timestamp,
    pub timestamp: Timestamp,
}

impl InteractionRecord {
    /// A fresh record in the STARTED stage with an empty response.
    pub fn started(
        session_id: SessionId,
        role_name: RoleName,
        step_id: StepId,
        round_index: u32,
        prompt: impl Into<String>,
    ) -> Self {
        let prompt = prompt.into();
        let now = Timestamp::now();
        Self {
            id: InteractionId::new(),
            session_id,
            message_id: None,
            role_name,
            step_id,
            round_index,
            metrics: PerformanceMetrics {
                prompt_chars: prompt.chars().count(),
                ..PerformanceMetrics::default()
            },
            prompt,
            response: String::new(),
            success: false,
            error: None,
            stage: InteractionStage::Started,
            started_at: now,
            timestamp: now,
        }
    }

    /// Moves to COMPLETED with a successful response.
    pub fn complete_success(&mut self, response: impl Into<String>, metrics: PerformanceMetrics) {
        self.response = response.into();
        self.success = true;
        self.error = None;
        self.metrics = metrics;
        self.stage = InteractionStage::Completed;
        self.timestamp = Timestamp::now();
    }

    /// Moves to COMPLETED with a failure.
    pub fn complete_failure(&mut self, error: impl Into<String>, metrics: PerformanceMetrics) {
        self.success = false;
        self.error = Some(error.into());
        self.metrics = metrics;
        self.stage = InteractionStage::Completed;
        self.timestamp = Timestamp::now();
    }

    /// Moves to FINALIZED, linking the persisted message.
    pub fn finalize(&mut self, message_id: MessageId) {
        self.message_id = Some(message_id);
        self.stage = InteractionStage::Finalized;
        self.timestamp = Timestamp::now();
    }

    /// A successful call whose message link was never written.
    pub fn is_orphaned(&self) -> bool {
        self.stage == InteractionStage::Completed && self.success
    }

    pub fn retention_class(&self) -> RetentionClass {
        if self.stage == InteractionStage::Finalized && self.success {
            RetentionClass::Success
        } else {
            RetentionClass::Failure
        }
    }

    /// Keeps whichever of two copies of the same record is further along.
    pub fn most_advanced(self, other: Self) -> Self {
        if other.stage >= self.stage {
            other
        } else {
            self
        }
    }
}

/// Folds a stage log into the latest copy of each record, oldest start first.
pub fn latest_by_id(log: impl IntoIterator<Item = InteractionRecord>) -> Vec<InteractionRecord> {
    let mut latest: HashMap<InteractionId, InteractionRecord> = HashMap::new();
    for record in log {
        let merged = match latest.remove(&record.id) {
            Some(existing) => existing.most_advanced(record),
            None => record,
        };
        latest.insert(merged.id, merged);
    }

    let mut records: Vec<_> = latest.into_values().collect();
    records.sort_by_key(|r| (r.started_at, r.id.to_string()));
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> InteractionRecord {
        InteractionRecord::started(
            SessionId::new(),
            RoleName::new("Analyst").unwrap(),
            StepId::new("s1").unwrap(),
            1,
            "prompt text",
        )
    }

    #[test]
    fn started_record_has_prompt_and_empty_response() {
        let r = record();
        assert_eq!(r.stage, InteractionStage::Started);
        assert_eq!(r.prompt, "prompt text");
        assert!(r.response.is_empty());
        assert!(r.message_id.is_none());
        assert_eq!(r.metrics.prompt_chars, 11);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(InteractionStage::Started < InteractionStage::Completed);
        assert!(InteractionStage::Completed < InteractionStage::Finalized);
    }

    #[test]
    fn completed_success_without_finalize_is_orphaned() {
        let mut r = record();
        r.complete_success("answer", PerformanceMetrics::default());
        assert!(r.is_orphaned());
        assert_eq!(r.retention_class(), RetentionClass::Failure);

        r.finalize(MessageId::new());
        assert!(!r.is_orphaned());
        assert_eq!(r.retention_class(), RetentionClass::Success);
    }

    #[test]
    fn failed_completion_is_not_orphaned() {
        let mut r = record();
        r.complete_failure("timeout", PerformanceMetrics::default());
        assert!(!r.is_orphaned());
        assert_eq!(r.error.as_deref(), Some("timeout"));
        assert_eq!(r.retention_class(), RetentionClass::Failure);
    }

    #[test]
    fn most_advanced_keeps_later_stage() {
        let started = record();
        let mut finalized = started.clone();
        finalized.complete_success("x", PerformanceMetrics::default());
        finalized.finalize(MessageId::new());

        let folded = finalized.clone().most_advanced(started.clone());
        assert_eq!(folded.stage, InteractionStage::Finalized);
        let folded = started.most_advanced(finalized);
        assert_eq!(folded.stage, InteractionStage::Finalized);
    }

    #[test]
    fn latest_by_id_folds_stage_log() {
        let first = record();
        let mut first_done = first.clone();
        first_done.complete_success("a", PerformanceMetrics::default());
        let second = record();

        let folded = latest_by_id(vec![first_done.clone(), second.clone(), first]);
        assert_eq!(folded.len(), 2);
        assert!(folded.contains(&first_done));
        assert!(folded.contains(&second));
    }

    #[test]
    fn serializes_stage_in_screaming_case() {
        let json = serde_json::to_string(&record()).unwrap();
        assert!(json.contains("\"stage\":\"STARTED\""));
    }
}
