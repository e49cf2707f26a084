//! Message Repository Implementation
//!
//! PostgreSQL implementation of message persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{MessageRepository, NewMessage, StoredMessage};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Columns assigned by the database on insert.
#[derive(Debug, sqlx::FromRow)]
struct InsertedRow {
    id: i64,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: &NewMessage) -> Result<StoredMessage, AppError> {
        let row = sqlx::query_as::<_, InsertedRow>(
            r#"
            INSERT INTO messenger.messages (chat_id, sender_id, content)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#,
        )
        .bind(message.chat_id.as_uuid())
        .bind(message.sender_id.as_uuid())
        .bind(&message.content)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredMessage {
            id: row.id,
            created_at: row.created_at,
        })
    }
}
