use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::message::{Message, NewMessage};

pub mod memory;
pub mod postgres;

pub use memory::MemoryMessageStore;
pub use postgres::PgMessageStore;

/// One row of the per-viewer conversation aggregation: the partner, the most
/// recent non-deleted message exchanged with them, and how many of their
/// messages the viewer has not read yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub partner_id: Uuid,
    pub last_message: Message,
    pub unread_count: i64,
}

/// Durable, ordered log of direct messages. The store is the single source
/// of truth for message and read state; read-state mutations are atomic
/// conditional updates, never read-modify-write in application code.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new message with `is_read = false` and a store-assigned
    /// id and `created_at`.
    async fn append(&self, new: NewMessage) -> Result<Message>;

    /// Fetch the newest `limit` non-deleted messages between the two
    /// participants, optionally older than `before`, returned oldest-first.
    async fn conversation_page(
        &self,
        viewer_id: Uuid,
        partner_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>>;

    /// Flip every unread message from `partner_id` to `viewer_id` to read,
    /// in one conditional update. Returns the number of messages flipped.
    async fn mark_conversation_read(&self, viewer_id: Uuid, partner_id: Uuid) -> Result<u64>;

    /// Mark a single message read, scoped to its recipient. Idempotent: an
    /// already-read message is returned unchanged, keeping its original
    /// `read_at`. `NotFound` when no message with that id belongs to the
    /// viewer as recipient.
    async fn mark_read(&self, message_id: Uuid, viewer_id: Uuid) -> Result<Message>;

    /// Group the viewer's non-deleted messages by partner and reduce each
    /// group to its latest message and unread count, newest conversation
    /// first. Authorization filtering happens above the store.
    async fn conversation_entries(&self, viewer_id: Uuid) -> Result<Vec<ConversationEntry>>;
}
