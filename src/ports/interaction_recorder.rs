//! Interaction recorder port.
//!
//! An append-only audit sink for provider interactions. `record` only has to
//! accept the write; durability may be deferred to a later flush. Callers in
//! the step path log and drop any error returned here.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::foundation::SessionId;
use crate::domain::interaction::InteractionRecord;

/// Recorder failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecorderError {
    /// A record could not be written or flushed.
    #[error("recorder write failed: {0}")]
    Write(String),

    #[error("recorder read failed: {0}")]
    Read(String),

    #[error("recorder is shut down")]
    Closed,
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Write(err.to_string())
    }
}

/// Port for the interaction audit trail.
#[async_trait]
pub trait InteractionRecorder: Send + Sync {
    /// Accept one stage write of a record.
    async fn record(&self, record: &InteractionRecord) -> Result<(), RecorderError>;

    /// Persist everything accepted so far.
    async fn flush(&self) -> Result<(), RecorderError>;

    /// Latest state of every record for a session, oldest first.
    async fn records_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<InteractionRecord>, RecorderError>;

    /// Latest state of every record started on `date` (UTC).
    async fn records_for_date(&self, date: NaiveDate)
        -> Result<Vec<InteractionRecord>, RecorderError>;

    /// Successful calls that never reached FINALIZED.
    async fn orphaned_records(&self) -> Result<Vec<InteractionRecord>, RecorderError>;
}
