use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::message::{Message, MessageType};
use crate::models::user::PartnerProfile;

/// Send payload. The id stays a string here so an unknown-shaped recipient
/// reports "not found" rather than a deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub recipient_id: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub partner_id: Uuid,
    pub partner: PartnerProfile,
    pub last_message: Message,
    pub unread_count: i64,
}
