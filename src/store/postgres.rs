use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::message::{Message, MessageType, NewMessage};
use crate::models::user::Role;
use crate::store::{ConversationEntry, MessageStore};

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    sender_role: Role,
    content: String,
    message_type: MessageType,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    partner_id: Uuid,
    unread_count: i64,
}

impl From<EntryRow> for ConversationEntry {
    fn from(row: EntryRow) -> Self {
        ConversationEntry {
            partner_id: row.partner_id,
            unread_count: row.unread_count,
            last_message: Message {
                id: row.id,
                sender_id: row.sender_id,
                recipient_id: row.recipient_id,
                sender_role: row.sender_role,
                content: row.content,
                message_type: row.message_type,
                is_read: row.is_read,
                read_at: row.read_at,
                is_deleted: row.is_deleted,
                created_at: row.created_at,
            },
        }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, new: NewMessage) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (sender_id, recipient_id, sender_role, content, message_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(new.sender_id)
        .bind(new.recipient_id)
        .bind(new.sender_role)
        .bind(&new.content)
        .bind(new.message_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn conversation_page(
        &self,
        viewer_id: Uuid,
        partner_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let mut messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE ((sender_id = $1 AND recipient_id = $2)
                OR (sender_id = $2 AND recipient_id = $1))
              AND is_deleted = FALSE
              AND ($3::timestamptz IS NULL OR created_at < $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(viewer_id)
        .bind(partner_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // Fetched newest-first for the LIMIT; callers want display order.
        messages.reverse();
        Ok(messages)
    }

    async fn mark_conversation_read(&self, viewer_id: Uuid, partner_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW()
            WHERE sender_id = $1 AND recipient_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(partner_id)
        .bind(viewer_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_read(&self, message_id: Uuid, viewer_id: Uuid) -> Result<Message> {
        let updated = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW()
            WHERE id = $1 AND recipient_id = $2 AND is_read = FALSE
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(viewer_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(message) = updated {
            return Ok(message);
        }

        // Already read, or not addressed to this viewer at all.
        sqlx::query_as::<_, Message>(
            r#"SELECT * FROM messages WHERE id = $1 AND recipient_id = $2"#,
        )
        .bind(message_id)
        .bind(viewer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Message not found".to_string()))
    }

    async fn conversation_entries(&self, viewer_id: Uuid) -> Result<Vec<ConversationEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(
            r#"
            SELECT id, sender_id, recipient_id, sender_role, content, message_type,
                   is_read, read_at, is_deleted, created_at, partner_id, unread_count
            FROM (
                SELECT m.*,
                       CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END
                           AS partner_id,
                       ROW_NUMBER() OVER (
                           PARTITION BY CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END
                           ORDER BY m.created_at DESC, m.id DESC
                       ) AS rn,
                       COUNT(*) FILTER (WHERE m.recipient_id = $1 AND m.is_read = FALSE) OVER (
                           PARTITION BY CASE WHEN m.sender_id = $1 THEN m.recipient_id ELSE m.sender_id END
                       ) AS unread_count
                FROM messages m
                WHERE (m.sender_id = $1 OR m.recipient_id = $1)
                  AND m.is_deleted = FALSE
            ) latest
            WHERE rn = 1
            ORDER BY created_at DESC
            "#,
        )
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConversationEntry::from).collect())
    }
}
