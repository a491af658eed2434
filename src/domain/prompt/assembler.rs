//! Prompt assembly.
//!
//! A prompt is built from four parts, in this order:
//!
//! 1. the speaker role's instruction profile
//! 2. the task-type instruction fragment (plus the step description)
//! 3. a delimited context section built from the resolved fragments
//! 4. an optional delimited reference section from knowledge retrieval
//!
//! Sections 3 and 4 are present exactly when their inputs are non-empty.

use serde::{Deserialize, Serialize};

use crate::domain::context::ContextFragment;
use crate::domain::flow::{FlowStep, RoleProfile, TaskType};
use crate::domain::foundation::ValidationError;

pub const CONTEXT_HEADING: &str = "## Conversation Context";
pub const CONTEXT_OPEN: &str = "<context>";
pub const CONTEXT_CLOSE: &str = "</context>";
pub const REFERENCE_HEADING: &str = "## Reference Material";
pub const REFERENCE_OPEN: &str = "<retrieved>";
pub const REFERENCE_CLOSE: &str = "</retrieved>";

/// A ranked excerpt returned by the knowledge retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedExcerpt {
    pub content: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Final prompt text plus facts about how it was built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledPrompt {
    pub text: String,
    pub task_type: TaskType,
    pub has_context_section: bool,
    pub context_fragment_count: usize,
    pub retrieval_excerpt_count: usize,
}

/// Builds prompts for flow steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    /// Assembles the prompt for `step` spoken by `role`.
    ///
    /// # Errors
    ///
    /// - `UnknownTaskType` if the step's task type is not registered
    pub fn assemble(
        role: &RoleProfile,
        step: &FlowStep,
        fragments: &[ContextFragment],
        excerpts: &[RetrievedExcerpt],
    ) -> Result<AssembledPrompt, ValidationError> {
        let task_type: TaskType = step.task_type.parse()?;

        let mut lines = vec![
            format!("# Role: {}", role.name),
            role.instructions.trim().to_string(),
            String::new(),
            "## Task".to_string(),
            task_type.instruction_for(step.target.as_ref()),
        ];
        if !step.description.trim().is_empty() {
            lines.push(format!("Step focus: {}", step.description.trim()));
        }
        let mut text = lines_to_text(lines);

        let has_context_section = !fragments.is_empty();
        if has_context_section {
            text.push('\n');
            text.push_str(&render_context(fragments));
        }

        if !excerpts.is_empty() {
            text.push('\n');
            text.push_str(&render_excerpts(excerpts));
        }

        Ok(AssembledPrompt {
            text,
            task_type,
            has_context_section,
            context_fragment_count: fragments.len(),
            retrieval_excerpt_count: excerpts.len(),
        })
    }
}

fn render_context(fragments: &[ContextFragment]) -> String {
    let mut lines = vec![CONTEXT_HEADING.to_string(), CONTEXT_OPEN.to_string()];
    for (i, fragment) in fragments.iter().enumerate() {
        let label = match (&fragment.source_role, fragment.round_index) {
            (Some(role), Some(round)) => format!("{} (round {})", role, round),
            (Some(role), None) => role.to_string(),
            (None, _) => "Topic".to_string(),
        };
        lines.push(format!("[{}] {}:", i + 1, label));
        lines.push(fragment.content.trim_end().to_string());
    }
    lines.push(CONTEXT_CLOSE.to_string());
    lines_to_text(lines)
}

fn render_excerpts(excerpts: &[RetrievedExcerpt]) -> String {
    let mut lines = vec![REFERENCE_HEADING.to_string(), REFERENCE_OPEN.to_string()];
    for (i, excerpt) in excerpts.iter().enumerate() {
        lines.push(match &excerpt.source {
            Some(source) => format!("[{}] {} (score {:.2}):", i + 1, source, excerpt.score),
            None => format!("[{}] (score {:.2}):", i + 1, excerpt.score),
        });
        lines.push(excerpt.content.trim_end().to_string());
    }
    lines.push(REFERENCE_CLOSE.to_string());
    lines_to_text(lines)
}

/// Joins lines, each terminated by a newline.
fn lines_to_text(lines: Vec<String>) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
