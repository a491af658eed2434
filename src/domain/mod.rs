//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, enums, errors)
//! - `flow` - Templates, steps, task types, context scopes, completion predicates
//! - `session` - Session progress and immutable messages
//! - `context` - Pure context resolution
//! - `prompt` - Prompt assembly
//! - `interaction` - Audit records for provider interactions

pub mod context;
pub mod flow;
pub mod foundation;
pub mod interaction;
pub mod prompt;
pub mod session;
