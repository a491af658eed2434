//! In-memory interaction recorder.
//!
//! Keeps the raw stage log so tests can assert on every write, not only the
//! folded result.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::{Mutex, PoisonError};

use crate::domain::foundation::SessionId;
use crate::domain::interaction::{latest_by_id, InteractionRecord, InteractionStage};
use crate::ports::{InteractionRecorder, RecorderError};

/// Recorder that holds every stage write in a vector.
#[derive(Default)]
pub struct InMemoryInteractionRecorder {
    log: Mutex<Vec<InteractionRecord>>,
    fail_on: Mutex<Vec<InteractionStage>>,
}

impl InMemoryInteractionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Rejects writes of the given stage.
    pub fn fail_on(&self, stage: InteractionStage) {
        self.fail_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);
    }

    /// Every stage write accepted so far, in order.
    pub fn writes(&self) -> Vec<InteractionRecord> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn latest(&self) -> Vec<InteractionRecord> {
        latest_by_id(self.writes())
    }
}

#[async_trait]
impl InteractionRecorder for InMemoryInteractionRecorder {
    async fn record(&self, record: &InteractionRecord) -> Result<(), RecorderError> {
        let rejected = self
            .fail_on
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&record.stage);
        if rejected {
            return Err(RecorderError::Write(format!(
                "{:?} writes are disabled",
                record.stage
            )));
        }

        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), RecorderError> {
        Ok(())
    }

    async fn records_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<InteractionRecord>, RecorderError> {
        Ok(self
            .latest()
            .into_iter()
            .filter(|r| &r.session_id == session_id)
            .collect())
    }

    async fn records_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<InteractionRecord>, RecorderError> {
        Ok(self
            .latest()
            .into_iter()
            .filter(|r| r.started_at.date() == date)
            .collect())
    }

    async fn orphaned_records(&self) -> Result<Vec<InteractionRecord>, RecorderError> {
        Ok(self.latest().into_iter().filter(|r| r.is_orphaned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{MessageId, RoleName, StepId};
    use crate::domain::interaction::PerformanceMetrics;

    fn started(session_id: SessionId) -> InteractionRecord {
        InteractionRecord::started(
            session_id,
            RoleName::new("host").unwrap(),
            StepId::new("open").unwrap(),
            1,
            "prompt",
        )
    }

    #[tokio::test]
    async fn queries_return_latest_stage() {
        let recorder = InMemoryInteractionRecorder::new();
        let session_id = SessionId::new();
        let mut record = started(session_id);
        recorder.record(&record).await.unwrap();
        record.complete_success("hello", PerformanceMetrics::default());
        recorder.record(&record).await.unwrap();
        record.finalize(MessageId::new());
        recorder.record(&record).await.unwrap();

        let records = recorder.records_for_session(&session_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, InteractionStage::Finalized);
        assert_eq!(recorder.writes().len(), 3);
    }

    #[tokio::test]
    async fn rejected_stage_leaves_orphan() {
        let recorder = InMemoryInteractionRecorder::new();
        recorder.fail_on(InteractionStage::Finalized);
        let mut record = started(SessionId::new());
        record.complete_success("hello", PerformanceMetrics::default());
        recorder.record(&record).await.unwrap();
        record.finalize(MessageId::new());

        assert!(recorder.record(&record).await.is_err());
        assert_eq!(recorder.orphaned_records().await.unwrap().len(), 1);
    }
}
