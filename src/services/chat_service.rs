use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::Identity;
use crate::directory::Directory;
use crate::dto::chat_dto::ConversationSummary;
use crate::error::{Error, Result};
use crate::models::message::{Message, MessageType, NewMessage};
use crate::models::user::{PartnerProfile, Role};
use crate::store::MessageStore;
use crate::ws::events::ServerEvent;
use crate::ws::ConnectionRegistry;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

/// Single funnel for message delivery. Every send, from REST or the live
/// channel, persists through the same store call and triggers the same
/// best-effort push to the recipient's connections.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn MessageStore>,
    directory: Arc<dyn Directory>,
    registry: ConnectionRegistry,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        registry: ConnectionRegistry,
    ) -> Self {
        Self {
            store,
            directory,
            registry,
        }
    }

    pub async fn send_message(
        &self,
        sender: &Identity,
        recipient_id: Uuid,
        content: String,
        message_type: MessageType,
    ) -> Result<Message> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(Error::BadRequest(
                "Content and recipientId are required".to_string(),
            ));
        }

        let recipient = self
            .directory
            .find_user(recipient_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| Error::NotFound("Recipient not found".to_string()))?;

        let message = self
            .store
            .append(NewMessage {
                sender_id: sender.user_id,
                recipient_id: recipient.id,
                sender_role: sender.role,
                content,
                message_type,
            })
            .await?;

        // Best-effort push; an offline recipient reads it from history later.
        let delivered = self
            .registry
            .push(recipient.id, &ServerEvent::NewMessage(message.clone()))
            .await;
        tracing::info!(
            "Message from {} to {} (pushed: {})",
            sender.display_name,
            recipient.visible_name(),
            delivered
        );

        Ok(message)
    }

    /// Returns a page of the conversation, oldest first, and marks everything
    /// the partner sent the viewer as read. The whole conversation flips, not
    /// only the returned page; the page itself reflects the state as fetched.
    pub async fn history(
        &self,
        viewer: &Identity,
        partner_id: Uuid,
        limit: Option<i64>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
        let messages = self
            .store
            .conversation_page(viewer.user_id, partner_id, limit, before)
            .await?;
        self.store
            .mark_conversation_read(viewer.user_id, partner_id)
            .await?;
        Ok(messages)
    }

    pub async fn mark_read(&self, message_id: Uuid, viewer_id: Uuid) -> Result<Message> {
        self.store.mark_read(message_id, viewer_id).await
    }

    pub async fn conversations(&self, viewer: &Identity) -> Result<Vec<ConversationSummary>> {
        let mut entries = self.store.conversation_entries(viewer.user_id).await?;

        // Doctors only see partners from their own patient list. The filter
        // runs after grouping so stray history stays intact in storage.
        if viewer.role == Role::Doctor {
            let assigned: HashSet<Uuid> = self
                .directory
                .assigned_patients(viewer.user_id)
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect();
            entries.retain(|e| assigned.contains(&e.partner_id));
        }

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(partner) = self.directory.find_user(entry.partner_id).await? else {
                continue;
            };
            summaries.push(ConversationSummary {
                partner_id: entry.partner_id,
                partner: PartnerProfile::from(&partner),
                last_message: entry.last_message,
                unread_count: entry.unread_count,
            });
        }
        Ok(summaries)
    }
}
