use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;

use crate::{
    auth::Identity,
    dto::chat_dto::{ConversationSummary, HistoryQuery, SendMessagePayload},
    error::{Error, Result},
    models::message::Message,
    AppState,
};

/// Conversation list for the caller, newest activity first.
pub async fn conversations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ConversationSummary>>> {
    let conversations = state.chat.conversations(&identity).await?;
    Ok(Json(conversations))
}

/// History with one partner, oldest first. Fetching as the recipient marks
/// the conversation read.
pub async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(partner_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>> {
    let messages = state
        .chat
        .history(&identity, partner_id, query.limit, query.before)
        .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<impl IntoResponse> {
    let (Some(recipient_id), Some(content)) = (payload.recipient_id, payload.content) else {
        return Err(Error::BadRequest(
            "Content and recipientId are required".to_string(),
        ));
    };
    let recipient_id = Uuid::parse_str(&recipient_id)
        .map_err(|_| Error::NotFound("Recipient not found".to_string()))?;

    let message = state
        .chat
        .send_message(&identity, recipient_id, content, payload.message_type)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Message>> {
    let message = state.chat.mark_read(message_id, identity.user_id).await?;
    Ok(Json(message))
}
