use std::sync::OnceLock;
use std::time::Instant;

use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Pins the uptime reference; called once at boot.
pub fn mark_started() {
    STARTED.get_or_init(Instant::now);
}

#[axum::debug_handler]
pub async fn health() -> impl IntoResponse {
    let uptime = STARTED.get_or_init(Instant::now).elapsed().as_secs();
    let body = json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": uptime,
    });
    (StatusCode::OK, Json(body))
}
