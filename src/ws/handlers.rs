use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::auth::Identity;
use crate::error::Error;
use crate::ws::events::{ClientEvent, ServerEvent};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub auth: Option<String>,
    pub token: Option<String>,
}

/// Connection credential, first match wins: explicit `auth` field, `token`
/// query parameter, Authorization header.
fn connect_token(params: &WsParams, headers: &HeaderMap) -> Option<String> {
    params
        .auth
        .clone()
        .or_else(|| params.token.clone())
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
                .map(|s| s.to_string())
        })
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(token) = connect_token(&params, &headers) else {
        return Error::Unauthorized("missing_token".to_string()).into_response();
    };
    let identity = match state.gate.verify(&token).await {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(state, identity, socket))
}

async fn handle_socket(state: AppState, identity: Identity, socket: WebSocket) {
    tracing::info!(
        "Live channel connected: {} ({})",
        identity.display_name,
        identity.user_id
    );

    let (mut sender, mut receiver) = socket.split();
    let mut outbox = state.registry.join(identity.user_id).await;

    // The credential's expiry is the one server-side cutoff; a connection
    // without a readable expiry is capped at a day.
    let remaining = match identity.expires_at {
        Some(at) => (at - Utc::now()).to_std().unwrap_or(Duration::ZERO),
        None => Duration::from_secs(24 * 60 * 60),
    };
    let expiry = tokio::time::sleep(remaining);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            maybe = outbox.recv() => {
                match maybe {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(reply) = handle_client_event(&state, &identity, &text).await {
                            let Ok(json) = serde_json::to_string(&reply) else {
                                continue;
                            };
                            if sender.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = &mut expiry => {
                let _ = sender.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }

    tracing::info!(
        "Live channel disconnected: {} ({})",
        identity.display_name,
        identity.user_id
    );
}

/// Failures travel back as `error` events with the same message the REST
/// surface would put in its body.
fn error_event(err: Error) -> ServerEvent {
    let message = match err {
        Error::BadRequest(msg) | Error::Unauthorized(msg) | Error::NotFound(msg) => msg,
        other => other.to_string(),
    };
    ServerEvent::Error { message }
}

/// Dispatches one client event. The returned event, if any, goes back on the
/// originating connection only; everything addressed to other users flows
/// through the registry.
async fn handle_client_event(
    state: &AppState,
    identity: &Identity,
    text: &str,
) -> Option<ServerEvent> {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(_) => {
            return Some(ServerEvent::Error {
                message: "Unrecognized event".to_string(),
            })
        }
    };

    match event {
        ClientEvent::SendMessage {
            recipient_id,
            content,
            message_type,
        } => match state
            .chat
            .send_message(identity, recipient_id, content, message_type)
            .await
        {
            Ok(message) => Some(ServerEvent::MessageSent(message)),
            Err(err) => Some(error_event(err)),
        },
        ClientEvent::MarkRead { message_id } => {
            match state.chat.mark_read(message_id, identity.user_id).await {
                Ok(message) => {
                    state
                        .registry
                        .push(
                            message.sender_id,
                            &ServerEvent::MessageRead {
                                message_id: message.id,
                                read_at: message.read_at,
                            },
                        )
                        .await;
                    None
                }
                Err(err) => Some(error_event(err)),
            }
        }
        ClientEvent::Typing {
            recipient_id,
            is_typing,
        } => {
            state
                .registry
                .push(
                    recipient_id,
                    &ServerEvent::UserTyping {
                        user_id: identity.user_id,
                        user_name: identity.display_name.clone(),
                        is_typing,
                    },
                )
                .await;
            None
        }
    }
}
