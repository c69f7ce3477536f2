use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod events;
pub mod handlers;

use events::ServerEvent;

/// Process-wide mapping from user id to that user's live connections. A user
/// may hold several at once (multi-device); a push addresses all of them.
/// Injected rather than global so a clustered deployment can swap in a
/// pub/sub backed registry.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Vec<UnboundedSender<WsMessage>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins a connection under the user's address and returns its outbox.
    /// The connection leaves the registry when the receiver is dropped and
    /// the next push prunes the dead sender.
    pub async fn join(&self, user_id: Uuid) -> UnboundedReceiver<WsMessage> {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.write().await;
        guard.entry(user_id).or_default().push(tx);
        rx
    }

    /// Whether the user currently holds at least one registered connection.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard.get(&user_id).is_some_and(|list| !list.is_empty())
    }

    /// Emits the event to every live connection of the user, pruning dead
    /// ones. Returns whether at least one connection took it.
    pub async fn push(&self, user_id: Uuid, event: &ServerEvent) -> bool {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!("Failed to serialize push event for {}: {:?}", user_id, err);
                return false;
            }
        };

        let mut guard = self.inner.write().await;
        let Some(list) = guard.get_mut(&user_id) else {
            return false;
        };
        list.retain(|sender| sender.send(WsMessage::Text(text.clone())).is_ok());
        if list.is_empty() {
            guard.remove(&user_id);
            return false;
        }
        true
    }
}
