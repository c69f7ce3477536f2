pub mod auth;
pub mod config;
pub mod database;
pub mod directory;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod ws;

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::{IdentityGate, JwtIdentityGate};
use crate::directory::{Directory, PgDirectory};
use crate::services::chat_service::ChatService;
use crate::store::{MessageStore, PgMessageStore};
use crate::ws::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub directory: Arc<dyn Directory>,
    pub gate: Arc<dyn IdentityGate>,
    pub registry: ConnectionRegistry,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let store = Arc::new(PgMessageStore::new(pool.clone()));
        let directory: Arc<dyn Directory> = Arc::new(PgDirectory::new(pool));
        let gate = Arc::new(JwtIdentityGate::new(directory.clone()));
        Self::with_parts(store, directory, gate)
    }

    /// Wires the state from explicit collaborators; tests hand in the
    /// in-memory implementations here.
    pub fn with_parts(
        store: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        gate: Arc<dyn IdentityGate>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        let chat = ChatService::new(store, directory.clone(), registry.clone());
        Self {
            chat,
            directory,
            gate,
            registry,
        }
    }
}
