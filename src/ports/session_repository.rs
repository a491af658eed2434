//! Session repository port.
//!
//! Persists sessions and their append-only message history.
//!
//! # Design
//!
//! - **Append-only messages**: a message is written once and never updated
//! - **Atomic step commit**: the new message and the session's new cursor
//!   are written together

use crate::domain::foundation::{DomainError, SessionId};
use crate::domain::session::{Message, MessageFilter, Session};
use async_trait::async_trait;

/// Repository port for sessions and messages.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Save a new session.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` on persistence failure
    async fn save(&self, session: &Session) -> Result<(), DomainError>;

    /// Update an existing session.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if session doesn't exist
    /// - `DatabaseError` on persistence failure
    async fn update(&self, session: &Session) -> Result<(), DomainError>;

    /// Find a session by its ID.
    ///
    /// Returns `None` if not found.
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError>;

    /// Append `message` and update `session` in one unit of work.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if session doesn't exist
    /// - `DuplicateMessage` if a message with the same id was already written
    /// - `DatabaseError` on persistence failure
    async fn commit_step(&self, session: &Session, message: &Message) -> Result<(), DomainError>;

    /// Messages of a session in insertion order, narrowed by `filter`.
    async fn messages(
        &self,
        session_id: &SessionId,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, DomainError>;

    /// Number of messages in a session.
    async fn message_count(&self, session_id: &SessionId) -> Result<usize, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn session_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn SessionRepository) {}
    }
}
