use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::auth::{decode_claims, Identity};
use crate::models::user::Role;
use crate::AppState;

fn bearer_token(headers: &HeaderMap) -> Result<String, Response> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"missing_authorization"})),
        )
            .into_response());
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"bad_authorization"})),
        )
            .into_response());
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"unsupported_scheme"})),
        )
            .into_response());
    };
    Ok(token.to_string())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, Response> {
    let token = bearer_token(headers)?;
    state.gate.verify(&token).await.map_err(|e| e.into_response())
}

/// Verifies the credential only. Registration and profile lookup run before
/// a directory account exists, so this layer stops at the token claims.
pub async fn require_credential(mut req: Request, next: Next) -> Response {
    let token = match bearer_token(req.headers()) {
        Ok(token) => token,
        Err(resp) => return resp,
    };
    match decode_claims(&token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

/// Verifies the credential and resolves it to a directory account.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let identity = match authenticate(&state, req.headers()).await {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    req.extensions_mut().insert(identity);
    next.run(req).await
}

pub async fn require_doctor_or_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = match authenticate(&state, req.headers()).await {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    if !matches!(identity.role, Role::Doctor | Role::Admin) {
        return (StatusCode::FORBIDDEN, Json(json!({"error":"forbidden"}))).into_response();
    }
    req.extensions_mut().insert(identity);
    next.run(req).await
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = match authenticate(&state, req.headers()).await {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    if identity.role != Role::Admin {
        return (StatusCode::FORBIDDEN, Json(json!({"error":"forbidden"}))).into_response();
    }
    req.extensions_mut().insert(identity);
    next.run(req).await
}
