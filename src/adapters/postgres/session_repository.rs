//! PostgreSQL implementation of SessionRepository.
//!
//! Sessions live in `flow_sessions`, messages in the insert-only
//! `flow_messages`. `commit_step` writes both inside one transaction.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::foundation::{
    DomainError, ErrorCode, MessageId, RoleName, SessionId, SessionStatus, StepId, TemplateId,
    Timestamp,
};
use crate::domain::session::{Message, MessageFilter, Session};
use crate::ports::SessionRepository;

/// PostgreSQL implementation of SessionRepository.
#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    /// Creates a new PostgresSessionRepository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_in(
        tx: &mut Transaction<'_, Postgres>,
        session: &Session,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE flow_sessions SET
                status = $2,
                cursor_index = $3,
                current_round = $4,
                failure_reason = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(session.id().as_uuid())
        .bind(session.status().as_str())
        .bind(session.cursor().map(|c| to_int("cursor_index", c)).transpose()?)
        .bind(to_int("current_round", session.current_round())?)
        .bind(session.failure_reason())
        .bind(session.updated_at().as_datetime())
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to update session", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::SessionNotFound,
                format!("Session not found: {}", session.id()),
            ));
        }
        Ok(())
    }
}

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

/// Narrows a counter to the `INTEGER` column that stores it.
fn to_int<T>(field: &str, value: T) -> Result<i32, DomainError>
where
    T: TryInto<i32> + Copy + std::fmt::Display,
{
    value.try_into().map_err(|_| {
        DomainError::new(
            ErrorCode::ValidationFailed,
            format!("{} {} does not fit in the database column", field, value),
        )
        .with_detail("field", field)
    })
}

/// Widens a stored integer back into its domain type. Negative values are corrupt.
fn from_int<T, S>(field: &str, value: S) -> Result<T, DomainError>
where
    T: TryFrom<S>,
    S: Copy + std::fmt::Display,
{
    T::try_from(value).map_err(|_| corrupt(field, format!("{} is out of range", value)))
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    async fn save(&self, session: &Session) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO flow_sessions (
                id, template_id, status, cursor_index, current_round,
                failure_reason, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(session.id().as_uuid())
        .bind(session.template_id().as_str())
        .bind(session.status().as_str())
        .bind(session.cursor().map(|c| to_int("cursor_index", c)).transpose()?)
        .bind(to_int("current_round", session.current_round())?)
        .bind(session.failure_reason())
        .bind(session.created_at().as_datetime())
        .bind(session.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert session", e))?;

        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        Self::update_in(&mut tx, session).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit session update", e))
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT id, template_id, status, cursor_index, current_round,
                   failure_reason, created_at, updated_at
            FROM flow_sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch session", e))?;

        row.map(row_to_session).transpose()
    }

    async fn commit_step(&self, session: &Session, message: &Message) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO flow_messages (
                id, session_id, step_id, round_index, speaker_role,
                target_role, content, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(message.id().as_uuid())
        .bind(message.session_id().as_uuid())
        .bind(message.step_id().as_str())
        .bind(to_int("round_index", message.round_index())?)
        .bind(message.speaker_role().as_str())
        .bind(message.target_role().map(|r| r.as_str()))
        .bind(message.content())
        .bind(message.created_at().as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DomainError::new(
                ErrorCode::DuplicateMessage,
                format!("Message already written: {}", message.id()),
            ),
            _ => db_error("Failed to insert message", e),
        })?;

        Self::update_in(&mut tx, session).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit step", e))
    }

    async fn messages(
        &self,
        session_id: &SessionId,
        filter: &MessageFilter,
    ) -> Result<Vec<Message>, DomainError> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, step_id, round_index, speaker_role,
                   target_role, content, created_at
            FROM flow_messages
            WHERE session_id = $1
              AND ($2::INT IS NULL OR round_index = $2)
              AND ($3::TEXT IS NULL OR speaker_role = $3)
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(filter.round.map(|r| to_int("round", r)).transpose()?)
        .bind(filter.speaker.as_ref().map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to fetch messages", e))?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn message_count(&self, session_id: &SessionId) -> Result<usize, DomainError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM flow_messages WHERE session_id = $1")
                .bind(session_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("Failed to count messages", e))?;

        from_int("message count", count.0)
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to read column {}: {}", name, e),
        )
    })
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} in database: {}", field, err),
    )
}

fn row_to_session(row: PgRow) -> Result<Session, DomainError> {
    let id: uuid::Uuid = column(&row, "id")?;
    let template_id: String = column(&row, "template_id")?;
    let status: String = column(&row, "status")?;
    let cursor: Option<i32> = column(&row, "cursor_index")?;
    let current_round: i32 = column(&row, "current_round")?;
    let failure_reason: Option<String> = column(&row, "failure_reason")?;
    let created_at: chrono::DateTime<chrono::Utc> = column(&row, "created_at")?;
    let updated_at: chrono::DateTime<chrono::Utc> = column(&row, "updated_at")?;

    Ok(Session::reconstitute(
        SessionId::from_uuid(id),
        TemplateId::new(template_id).map_err(|e| corrupt("template_id", e))?,
        status.parse::<SessionStatus>().map_err(|e| corrupt("status", e))?,
        cursor.map(|c| from_int("cursor_index", c)).transpose()?,
        from_int("current_round", current_round)?,
        failure_reason,
        Timestamp::from_datetime(created_at),
        Timestamp::from_datetime(updated_at),
    ))
}

fn row_to_message(row: PgRow) -> Result<Message, DomainError> {
    let id: uuid::Uuid = column(&row, "id")?;
    let session_id: uuid::Uuid = column(&row, "session_id")?;
    let step_id: String = column(&row, "step_id")?;
    let round_index: i32 = column(&row, "round_index")?;
    let speaker: String = column(&row, "speaker_role")?;
    let target: Option<String> = column(&row, "target_role")?;
    let content: String = column(&row, "content")?;
    let created_at: chrono::DateTime<chrono::Utc> = column(&row, "created_at")?;

    Ok(Message::reconstitute(
        MessageId::from_uuid(id),
        SessionId::from_uuid(session_id),
        StepId::new(step_id).map_err(|e| corrupt("step_id", e))?,
        from_int("round_index", round_index)?,
        RoleName::new(speaker).map_err(|e| corrupt("speaker_role", e))?,
        target
            .map(RoleName::new)
            .transpose()
            .map_err(|e| corrupt("target_role", e))?,
        content,
        Timestamp::from_datetime(created_at),
    ))
}
