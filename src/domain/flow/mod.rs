//! Flow definitions: templates, steps, task types, context scopes and
//! completion predicates.

mod completion;
mod context_scope;
mod role;
mod task_type;
mod template;

pub use completion::{CompletionFacts, CompletionPredicate};
pub use context_scope::{ContextParam, ContextScope, RawScope};
pub use role::RoleProfile;
pub use task_type::TaskType;
pub use template::{FlowStep, FlowTemplate, FlowTemplateDef, RetrievalConfig, Transition};
