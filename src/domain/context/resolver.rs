//! Context resolution.
//!
//! Turns a step's declarative context scope into the concrete slice of prior
//! messages its prompt will show. Resolution is a pure function of the message
//! history, the session's current round, the scope and its parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::flow::{ContextParam, ContextScope};
use crate::domain::foundation::{MessageId, RoleName, ValidationError};
use crate::domain::session::Message;

/// One piece of resolved context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFragment {
    /// Role that authored the source message. `None` for preset topics.
    pub source_role: Option<RoleName>,
    pub content: String,
    pub message_id: Option<MessageId>,
    pub round_index: Option<u32>,
}

impl ContextFragment {
    fn from_message(message: &Message) -> Self {
        Self {
            source_role: Some(message.speaker_role().clone()),
            content: message.content().to_string(),
            message_id: Some(*message.id()),
            round_index: Some(message.round_index()),
        }
    }

    fn topic(text: &str) -> Self {
        Self {
            source_role: None,
            content: text.to_string(),
            message_id: None,
            round_index: None,
        }
    }
}

/// Resolves context scopes against a session's message history.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextResolver;

impl ContextResolver {
    /// Resolves `scope` over `history`, which must be in insertion order.
    ///
    /// `current_round` is the round the step being prompted belongs to. Rounds
    /// below it are complete.
    ///
    /// # Errors
    ///
    /// - `MissingTopic` when a preset-topic scope has no topic text
    pub fn resolve(
        history: &[Message],
        scope: &ContextScope,
        param: &ContextParam,
        current_round: u32,
    ) -> Result<Vec<ContextFragment>, ValidationError> {
        let fragments = match scope {
            ContextScope::None => Vec::new(),
            ContextScope::LastMessage => history
                .last()
                .map(ContextFragment::from_message)
                .into_iter()
                .collect(),
            ContextScope::LastRound => Self::last_completed_round(history, current_round),
            ContextScope::All => history.iter().map(ContextFragment::from_message).collect(),
            ContextScope::Roles(roles) if roles.is_empty() => Self::by_roles(history, &param.roles),
            ContextScope::Roles(roles) => Self::by_roles(history, roles),
            ContextScope::PresetTopic => {
                let topic = param
                    .topic
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or(ValidationError::MissingTopic)?;
                vec![ContextFragment::topic(topic)]
            }
        };
        Ok(fragments)
    }

    /// Messages from the most recent completed round that has any.
    ///
    /// Empty while the session is still in its first round.
    fn last_completed_round(history: &[Message], current_round: u32) -> Vec<ContextFragment> {
        let Some(round) = history
            .iter()
            .map(Message::round_index)
            .filter(|r| *r < current_round)
            .max()
        else {
            return Vec::new();
        };
        history
            .iter()
            .filter(|m| m.round_index() == round)
            .map(ContextFragment::from_message)
            .collect()
    }

    /// Latest message of each listed role, in list order.
    ///
    /// Same-role ties resolve to the later insertion. Roles that have not
    /// spoken are skipped and repeated names are listed once.
    fn by_roles(history: &[Message], roles: &[RoleName]) -> Vec<ContextFragment> {
        let mut seen = HashSet::new();
        roles
            .iter()
            .filter(|role| seen.insert(role.as_str()))
            .filter_map(|role| history.iter().rev().find(|m| m.speaker_role() == role))
            .map(ContextFragment::from_message)
            .collect()
    }
}
