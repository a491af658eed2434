//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSessionRepository` - sessions and their message history

mod session_repository;

pub use session_repository::PostgresSessionRepository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Opens a connection pool and applies pending migrations when configured to.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect(&config.url)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to connect: {}", e))
        })?;

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Migration failed: {}", e))
        })?;
        tracing::info!("database migrations applied");
    }

    Ok(pool)
}
