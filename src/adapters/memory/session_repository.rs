//! In-memory session repository.
//!
//! Used by tests and by the server when no database is configured.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SessionId};
use crate::domain::session::{Message, MessageFilter, Session};
use crate::ports::SessionRepository;

#[derive(Default)]
struct Store {
    sessions: HashMap<SessionId, Session>,
    messages: HashMap<SessionId, Vec<Message>>,
}

/// Session and message storage backed by a hash map.
#[derive(Default)]
pub struct InMemorySessionRepository {
    store: RwLock<Store>,
    fail_commits: AtomicBool,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Makes every subsequent `commit_step` fail with a database error.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub async fn session_count(&self) -> usize {
        self.store.read().await.sessions.len()
    }
}

fn not_found(id: &SessionId) -> DomainError {
    DomainError::new(ErrorCode::SessionNotFound, "Session not found")
        .with_detail("session_id", id.to_string())
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, session: &Session) -> Result<(), DomainError> {
        let mut store = self.store.write().await;
        store.sessions.insert(*session.id(), session.clone());
        store.messages.entry(*session.id()).or_default();
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<(), DomainError> {
        let mut store = self.store.write().await;
        match store.sessions.get_mut(session.id()) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(not_found(session.id())),
        }
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        Ok(self.store.read().await.sessions.get(id).cloned())
    }

    async fn commit_step(&self, session: &Session, message: &Message) -> Result<(), DomainError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "commit rejected by test configuration",
            ));
        }

        let mut store = self.store.write().await;
        if !store.sessions.contains_key(session.id()) {
            return Err(not_found(session.id()));
        }

        let history = store.messages.entry(*session.id()).or_default();
        if history.iter().any(|m| m.id() == message.id()) {
            return Err(DomainError::new(ErrorCode::DuplicateMessage, "Message already written")
                .with_detail("message_id", message.id().to_string()));
        }
        history.push(message.clone());
        store.sessions.insert(*session.id(), session.clone());
        Ok(())
    }

    async fn messages(
        &self,
        session_id: &SessionId,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, DomainError> {
        let store = self.store.read().await;
        Ok(store
            .messages
            .get(session_id)
            .map(|history| history.iter().filter(|m| filter.matches(m)).cloned().collect())
            .unwrap_or_default())
    }

    async fn message_count(&self, session_id: &SessionId) -> Result<usize, DomainError> {
        let store = self.store.read().await;
        Ok(store.messages.get(session_id).map(Vec::len).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{RoleName, StepId, TemplateId};

    fn session() -> Session {
        Session::new(SessionId::new(), TemplateId::new("debate").unwrap())
    }

    fn message(session: &Session, round: u32, speaker: &str) -> Message {
        Message::new(
            *session.id(),
            StepId::new("s1").unwrap(),
            round,
            RoleName::new(speaker).unwrap(),
            None,
            format!("{} says hi", speaker),
        )
    }

    #[tokio::test]
    async fn save_and_find() {
        let repo = InMemorySessionRepository::new();
        let session = session();
        repo.save(&session).await.unwrap();

        let found = repo.find_by_id(session.id()).await.unwrap();
        assert_eq!(found, Some(session));
    }

    #[tokio::test]
    async fn update_unknown_session_is_not_found() {
        let repo = InMemorySessionRepository::new();
        let err = repo.update(&session()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SessionNotFound);
    }

    #[tokio::test]
    async fn commit_step_appends_message_and_updates_session() {
        let repo = InMemorySessionRepository::new();
        let mut session = session();
        repo.save(&session).await.unwrap();

        session.begin().unwrap();
        session.advance_to(1, false).unwrap();
        repo.commit_step(&session, &message(&session, 1, "host")).await.unwrap();

        let stored = repo.find_by_id(session.id()).await.unwrap().unwrap();
        assert_eq!(stored.cursor(), Some(1));
        assert_eq!(repo.message_count(session.id()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn commit_step_rejects_duplicate_message() {
        let repo = InMemorySessionRepository::new();
        let session = session();
        repo.save(&session).await.unwrap();
        let msg = message(&session, 1, "host");

        repo.commit_step(&session, &msg).await.unwrap();
        let err = repo.commit_step(&session, &msg).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateMessage);
    }

    #[tokio::test]
    async fn failed_commit_changes_nothing() {
        let repo = InMemorySessionRepository::new();
        let session = session();
        repo.save(&session).await.unwrap();
        repo.fail_commits(true);

        assert!(repo.commit_step(&session, &message(&session, 1, "host")).await.is_err());
        assert_eq!(repo.message_count(session.id()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn messages_are_filtered_in_insertion_order() {
        let repo = InMemorySessionRepository::new();
        let session = session();
        repo.save(&session).await.unwrap();
        for (round, speaker) in [(1, "host"), (1, "guest"), (2, "host")] {
            repo.commit_step(&session, &message(&session, round, speaker)).await.unwrap();
        }

        let host = repo
            .messages(session.id(), &MessageFilter::speaker(RoleName::new("host").unwrap()))
            .await
            .unwrap();
        assert_eq!(host.len(), 2);
        assert_eq!(host[0].round_index(), 1);
        assert_eq!(host[1].round_index(), 2);

        let round_one = repo.messages(session.id(), &MessageFilter::round(1)).await.unwrap();
        assert_eq!(round_one.len(), 2);
    }
}
