use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::{Message, MessageType};

/// Events a connected client may submit over the live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        recipient_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: MessageType,
    },
    #[serde(rename_all = "camelCase")]
    MarkRead { message_id: Uuid },
    #[serde(rename_all = "camelCase")]
    Typing { recipient_id: Uuid, is_typing: bool },
}

/// Events the server pushes to connected clients. `new_message` goes to the
/// recipient's address, `message_sent` and `error` only to the connection
/// that caused them, `message_read` to the original sender of the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(Message),
    MessageSent(Message),
    #[serde(rename_all = "camelCase")]
    MessageRead {
        message_id: Uuid,
        read_at: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: Uuid,
        user_name: String,
        is_typing: bool,
    },
    Error { message: String },
}
