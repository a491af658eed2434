//! Messages produced by flow steps.

use crate::domain::foundation::{MessageId, RoleName, SessionId, StepId, Timestamp};
use serde::{Deserialize, Serialize};

/// One utterance in a session. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    session_id: SessionId,
    step_id: StepId,
    round_index: u32,
    speaker_role: RoleName,
    target_role: Option<RoleName>,
    content: String,
    created_at: Timestamp,
}

impl Message {
    /// Creates a new message stamped with the current time.
    pub fn new(
        session_id: SessionId,
        step_id: StepId,
        round_index: u32,
        speaker_role: RoleName,
        target_role: Option<RoleName>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            step_id,
            round_index,
            speaker_role,
            target_role,
            content: content.into(),
            created_at: Timestamp::now(),
        }
    }

    /// Reconstitute a message from persistence.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: MessageId,
        session_id: SessionId,
        step_id: StepId,
        round_index: u32,
        speaker_role: RoleName,
        target_role: Option<RoleName>,
        content: String,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            session_id,
            step_id,
            round_index,
            speaker_role,
            target_role,
            content,
            created_at,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    pub fn round_index(&self) -> u32 {
        self.round_index
    }

    pub fn speaker_role(&self) -> &RoleName {
        &self.speaker_role
    }

    pub fn target_role(&self) -> Option<&RoleName> {
        self.target_role.as_ref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }
}

/// Filter for fetching a subset of a session's messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub round: Option<u32>,
    pub speaker: Option<RoleName>,
}

impl MessageFilter {
    pub fn round(round: u32) -> Self {
        Self {
            round: Some(round),
            speaker: None,
        }
    }

    pub fn speaker(role: RoleName) -> Self {
        Self {
            round: None,
            speaker: Some(role),
        }
    }

    /// Returns true if the message passes every set criterion.
    pub fn matches(&self, message: &Message) -> bool {
        self.round.map_or(true, |r| message.round_index() == r)
            && self
                .speaker
                .as_ref()
                .map_or(true, |s| message.speaker_role() == s)
    }
}
