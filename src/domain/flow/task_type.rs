//! Task type registry.
//!
//! Each task type names the speech act a step asks the model to perform and
//! carries a fixed instruction fragment. Templates store task types as raw
//! strings; lookup happens at prompt assembly so an unknown value fails the
//! step instead of silently degrading to a generic instruction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{RoleName, ValidationError};

/// Speech act a flow step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Introduce,
    AskQuestion,
    AnswerQuestion,
    ReviewAnswer,
    Clarify,
    Summarize,
    Evaluate,
    Suggest,
    Challenge,
    Support,
    Conclude,
}

impl TaskType {
    /// All registered task types.
    pub const ALL: [TaskType; 11] = [
        TaskType::Introduce,
        TaskType::AskQuestion,
        TaskType::AnswerQuestion,
        TaskType::ReviewAnswer,
        TaskType::Clarify,
        TaskType::Summarize,
        TaskType::Evaluate,
        TaskType::Suggest,
        TaskType::Challenge,
        TaskType::Support,
        TaskType::Conclude,
    ];

    /// Registry key as written in templates.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Introduce => "introduce",
            TaskType::AskQuestion => "ask_question",
            TaskType::AnswerQuestion => "answer_question",
            TaskType::ReviewAnswer => "review_answer",
            TaskType::Clarify => "clarify",
            TaskType::Summarize => "summarize",
            TaskType::Evaluate => "evaluate",
            TaskType::Suggest => "suggest",
            TaskType::Challenge => "challenge",
            TaskType::Support => "support",
            TaskType::Conclude => "conclude",
        }
    }

    /// Base instruction fragment for this task type.
    pub fn instruction(&self) -> &'static str {
        match self {
            TaskType::Introduce => {
                "Open the discussion. Introduce yourself in your role and frame the topic for the other participants."
            }
            TaskType::AskQuestion => {
                "Ask one focused, substantive question that moves the discussion forward. Do not answer it yourself."
            }
            TaskType::AnswerQuestion => {
                "Answer the most recent question directed at you. Be specific and draw on your role's expertise."
            }
            TaskType::ReviewAnswer => {
                "Review the answer given so far. Point out what is accurate, what is missing, and what is questionable."
            }
            TaskType::Clarify => {
                "Ask for or provide clarification on the point that is least clear in the discussion so far."
            }
            TaskType::Summarize => {
                "Summarize the discussion so far: the main positions, points of agreement, and open issues."
            }
            TaskType::Evaluate => {
                "Evaluate the arguments presented against clear criteria and state your assessment with reasons."
            }
            TaskType::Suggest => {
                "Propose concrete, actionable suggestions that build on the discussion so far."
            }
            TaskType::Challenge => {
                "Challenge the weakest assumption or claim in the discussion with a well-reasoned counterpoint."
            }
            TaskType::Support => {
                "Support the strongest position in the discussion with additional evidence or reasoning."
            }
            TaskType::Conclude => {
                "Bring the discussion to a close with a clear conclusion and any agreed next steps."
            }
        }
    }

    /// Instruction fragment with the optional target role woven in.
    pub fn instruction_for(&self, target: Option<&RoleName>) -> String {
        match target {
            Some(target) => format!(
                "{} Address your response to {}.",
                self.instruction(),
                target
            ),
            None => self.instruction().to_string(),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        TaskType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownTaskType(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_type_parses_from_its_key() {
        for task in TaskType::ALL {
            assert_eq!(task.as_str().parse::<TaskType>().unwrap(), task);
        }
    }

    #[test]
    fn unknown_type_is_a_validation_error() {
        let err = "sing_a_song".parse::<TaskType>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownTaskType("sing_a_song".into()));
    }

    #[test]
    fn instruction_mentions_target_when_present() {
        let target = RoleName::new("Engineer").unwrap();
        let text = TaskType::AskQuestion.instruction_for(Some(&target));
        assert!(text.starts_with(TaskType::AskQuestion.instruction()));
        assert!(text.ends_with("Address your response to Engineer."));
    }

    #[test]
    fn instructions_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for task in TaskType::ALL {
            assert!(seen.insert(task.instruction()));
        }
    }
}
