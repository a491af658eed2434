//! In-memory adapters.
//!
//! Used by unit tests and by the server when no database is configured.

mod catalog;
mod recorder;
mod session_repository;

pub use catalog::{InMemoryRoleRepository, InMemoryTemplateRepository};
pub use recorder::InMemoryInteractionRecorder;
pub use session_repository::InMemorySessionRepository;
