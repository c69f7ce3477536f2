use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::message::{Message, NewMessage};
use crate::store::{ConversationEntry, MessageStore};

/// In-memory message store with the same observable semantics as the
/// Postgres store. Backs the integration tests and local development; every
/// operation takes the lock once, so read-state flips are as atomic as their
/// SQL counterparts.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn soft_delete(&self, message_id: Uuid) {
        let mut messages = self.messages.write().await;
        if let Some(message) = messages.iter_mut().find(|m| m.id == message_id) {
            message.is_deleted = true;
        }
    }
}

fn involves(message: &Message, a: Uuid, b: Uuid) -> bool {
    (message.sender_id == a && message.recipient_id == b)
        || (message.sender_id == b && message.recipient_id == a)
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, new: NewMessage) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            recipient_id: new.recipient_id,
            sender_role: new.sender_role,
            content: new.content,
            message_type: new.message_type,
            is_read: false,
            read_at: None,
            is_deleted: false,
            created_at: Utc::now(),
        };

        let mut messages = self.messages.write().await;
        messages.push(message.clone());
        Ok(message)
    }

    async fn conversation_page(
        &self,
        viewer_id: Uuid,
        partner_id: Uuid,
        limit: i64,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let messages = self.messages.read().await;
        let matching: Vec<Message> = messages
            .iter()
            .filter(|m| involves(m, viewer_id, partner_id) && !m.is_deleted)
            .filter(|m| before.map_or(true, |cutoff| m.created_at < cutoff))
            .cloned()
            .collect();

        // Insertion order is chronological; the page is the newest `limit`
        // entries, kept oldest-first for display.
        let limit = limit.max(0) as usize;
        let start = matching.len().saturating_sub(limit);
        Ok(matching[start..].to_vec())
    }

    async fn mark_conversation_read(&self, viewer_id: Uuid, partner_id: Uuid) -> Result<u64> {
        let now = Utc::now();
        let mut messages = self.messages.write().await;
        let mut flipped = 0;
        for message in messages.iter_mut() {
            if message.sender_id == partner_id
                && message.recipient_id == viewer_id
                && !message.is_read
            {
                message.is_read = true;
                message.read_at = Some(now);
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn mark_read(&self, message_id: Uuid, viewer_id: Uuid) -> Result<Message> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id && m.recipient_id == viewer_id)
            .ok_or_else(|| Error::NotFound("Message not found".to_string()))?;

        if !message.is_read {
            message.is_read = true;
            message.read_at = Some(Utc::now());
        }
        Ok(message.clone())
    }

    async fn conversation_entries(&self, viewer_id: Uuid) -> Result<Vec<ConversationEntry>> {
        let messages = self.messages.read().await;
        let mut by_partner: HashMap<Uuid, ConversationEntry> = HashMap::new();

        for message in messages.iter() {
            if message.is_deleted {
                continue;
            }
            let partner_id = if message.sender_id == viewer_id {
                message.recipient_id
            } else if message.recipient_id == viewer_id {
                message.sender_id
            } else {
                continue;
            };

            let unread_here = (message.recipient_id == viewer_id && !message.is_read) as i64;
            match by_partner.get_mut(&partner_id) {
                Some(entry) => {
                    entry.last_message = message.clone();
                    entry.unread_count += unread_here;
                }
                None => {
                    by_partner.insert(
                        partner_id,
                        ConversationEntry {
                            partner_id,
                            last_message: message.clone(),
                            unread_count: unread_here,
                        },
                    );
                }
            }
        }

        let mut entries: Vec<ConversationEntry> = by_partner.into_values().collect();
        entries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
        Ok(entries)
    }
}
