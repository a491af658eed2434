//! Flow templates, their steps, and next-step resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{CompletionPredicate, ContextParam, ContextScope};
use crate::domain::foundation::{RoleName, StepId, TemplateId, ValidationError};

fn default_top_k() -> usize {
    3
}

/// Knowledge retrieval settings for a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Datasets the retriever should search.
    pub dataset_ids: Vec<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Excerpts scoring below this are discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,

    /// Fixed query text. When absent the query is derived from context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// One unit of a flow template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStep {
    pub id: StepId,
    pub order: u32,
    pub speaker: RoleName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<RoleName>,

    /// Raw task type key. Resolved against the registry at prompt assembly.
    pub task_type: String,

    #[serde(default)]
    pub context_scope: ContextScope,

    #[serde(default)]
    pub context_param: ContextParam,

    /// Explicit branch override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step_id: Option<StepId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalConfig>,

    #[serde(default)]
    pub description: String,
}

impl FlowStep {
    /// Creates a step with no target, no context and no branch override.
    pub fn new(id: StepId, order: u32, speaker: RoleName, task_type: impl Into<String>) -> Self {
        Self {
            id,
            order,
            speaker,
            target: None,
            task_type: task_type.into(),
            context_scope: ContextScope::None,
            context_param: ContextParam::default(),
            next_step_id: None,
            retrieval: None,
            description: String::new(),
        }
    }

    pub fn with_target(mut self, target: RoleName) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_scope(mut self, scope: ContextScope) -> Self {
        self.context_scope = scope;
        self
    }

    pub fn with_param(mut self, param: ContextParam) -> Self {
        self.context_param = param;
        self
    }

    pub fn with_next(mut self, next: StepId) -> Self {
        self.next_step_id = Some(next);
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Result of resolving where a session goes after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move the cursor to `index`. `new_round` is set when the target step
    /// does not come after the current one.
    Advance { index: usize, new_round: bool },
    /// No further step; the completion predicate decides what happens.
    EndOfSequence,
}

/// A reusable, validated definition of an ordered multi-role conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FlowTemplateDef")]
pub struct FlowTemplate {
    id: TemplateId,
    name: String,
    steps: Vec<FlowStep>,
    completion: CompletionPredicate,
}

/// Unvalidated template shape as read from YAML or JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowTemplateDef {
    pub id: TemplateId,
    pub name: String,
    pub steps: Vec<FlowStep>,
    #[serde(default)]
    pub completion: CompletionPredicate,
}

impl TryFrom<FlowTemplateDef> for FlowTemplate {
    type Error = ValidationError;

    fn try_from(def: FlowTemplateDef) -> Result<Self, Self::Error> {
        FlowTemplate::new(def.id, def.name, def.steps, def.completion)
    }
}

impl FlowTemplate {
    /// Creates a template, checking structural invariants.
    ///
    /// Steps must be listed with strictly increasing `order`, ids must be
    /// unique, and every `next_step_id` must name a step in the template.
    /// Task types and role references are resolved later, at execution.
    pub fn new(
        id: TemplateId,
        name: impl Into<String>,
        steps: Vec<FlowStep>,
        completion: CompletionPredicate,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::empty_field("name"));
        }
        if steps.is_empty() {
            return Err(ValidationError::EmptyTemplate);
        }

        for pair in steps.windows(2) {
            if pair[1].order <= pair[0].order {
                return Err(ValidationError::NonIncreasingOrder {
                    previous: pair[0].order,
                    next: pair[1].order,
                });
            }
        }

        let mut ids = HashSet::new();
        for step in &steps {
            if !ids.insert(step.id.as_str()) {
                return Err(ValidationError::DuplicateStep(step.id.to_string()));
            }
        }

        for step in &steps {
            if let Some(next) = &step.next_step_id {
                if !ids.contains(next.as_str()) {
                    return Err(ValidationError::UnknownNextStep {
                        step: step.id.to_string(),
                        next: next.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            id,
            name,
            steps,
            completion,
        })
    }

    pub fn id(&self) -> &TemplateId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&FlowStep> {
        self.steps.get(index)
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn completion(&self) -> CompletionPredicate {
        self.completion
    }

    /// Index of the step with the given id.
    pub fn index_of(&self, step_id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == step_id)
    }

    /// Resolves the step that follows `index`.
    ///
    /// Explicit `next_step_id` wins, then the next step in order, then end of
    /// sequence.
    pub fn transition_from(&self, index: usize) -> Transition {
        let Some(current) = self.steps.get(index) else {
            return Transition::EndOfSequence;
        };

        let target = match &current.next_step_id {
            Some(next) => self.index_of(next),
            None if index + 1 < self.steps.len() => Some(index + 1),
            None => None,
        };

        match target {
            Some(target) => Transition::Advance {
                index: target,
                new_round: self.steps[target].order <= current.order,
            },
            None => Transition::EndOfSequence,
        }
    }

    /// Whether moving the cursor from `from` to `to` starts a new round.
    pub fn starts_new_round(&self, from: Option<usize>, to: usize) -> bool {
        match (from.and_then(|i| self.steps.get(i)), self.steps.get(to)) {
            (Some(current), Some(target)) => target.order <= current.order,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, order: u32, speaker: &str) -> FlowStep {
        FlowStep::new(
            StepId::new(id).unwrap(),
            order,
            RoleName::new(speaker).unwrap(),
            "ask_question",
        )
    }

    fn template(steps: Vec<FlowStep>) -> Result<FlowTemplate, ValidationError> {
        FlowTemplate::new(
            TemplateId::new("panel").unwrap(),
            "Panel",
            steps,
            CompletionPredicate::Always,
        )
    }

    #[test]
    fn rejects_empty_template() {
        assert_eq!(template(vec![]).unwrap_err(), ValidationError::EmptyTemplate);
    }

    #[test]
    fn rejects_non_increasing_order() {
        let err = template(vec![step("a", 2, "A"), step("b", 2, "B")]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonIncreasingOrder {
                previous: 2,
                next: 2
            }
        );
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let err = template(vec![step("a", 1, "A"), step("a", 2, "B")]).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateStep("a".into()));
    }

    #[test]
    fn rejects_dangling_next_step() {
        let err = template(vec![
            step("a", 1, "A").with_next(StepId::new("zzz").unwrap()),
            step("b", 2, "B"),
        ])
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownNextStep { .. }));
    }

    #[test]
    fn unknown_task_type_is_accepted_at_load() {
        let mut s = step("a", 1, "A");
        s.task_type = "not_registered".into();
        assert!(template(vec![s]).is_ok());
    }

    #[test]
    fn sequential_transition_stays_in_round() {
        let t = template(vec![step("a", 1, "A"), step("b", 2, "B")]).unwrap();
        assert_eq!(
            t.transition_from(0),
            Transition::Advance {
                index: 1,
                new_round: false
            }
        );
        assert_eq!(t.transition_from(1), Transition::EndOfSequence);
    }

    #[test]
    fn explicit_next_step_wins_and_loops_start_new_round() {
        let t = template(vec![
            step("a", 1, "A"),
            step("b", 2, "B").with_next(StepId::new("a").unwrap()),
            step("c", 3, "C"),
        ])
        .unwrap();
        assert_eq!(
            t.transition_from(1),
            Transition::Advance {
                index: 0,
                new_round: true
            }
        );
    }

    #[test]
    fn self_loop_starts_new_round() {
        let t = template(vec![step("a", 1, "A").with_next(StepId::new("a").unwrap())]).unwrap();
        assert_eq!(
            t.transition_from(0),
            Transition::Advance {
                index: 0,
                new_round: true
            }
        );
    }

    #[test]
    fn deserializes_and_validates_yaml() {
        let yaml = r#"
id: expert-panel
name: Expert panel
completion: min_rounds:1
steps:
  - id: open
    order: 1
    speaker: Moderator
    task_type: introduce
    context_scope: preset-topic
    context_param:
      topic: Vascular intervention products
  - id: reply
    order: 2
    speaker: Engineer
    target: Moderator
    task_type: answer_question
    context_scope: [Moderator]
"#;
        let t: FlowTemplate = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(t.total_steps(), 2);
        assert_eq!(t.completion(), CompletionPredicate::MinRounds(1));
        assert_eq!(
            t.steps()[1].context_scope,
            ContextScope::roles(["Moderator"]).unwrap()
        );
    }

    #[test]
    fn invalid_yaml_template_fails_to_deserialize() {
        let yaml = r#"
id: broken
name: Broken
steps: []
"#;
        assert!(serde_yaml::from_str::<FlowTemplate>(yaml).is_err());
    }
}
