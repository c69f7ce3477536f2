use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::get_config;
use crate::directory::Directory;
use crate::error::{Error, Result};
use crate::models::user::Role;

/// Payload of the bearer credential issued by the identity provider. The
/// subject is the provider-side id, not a directory row id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

/// A verified caller: credential checked and resolved to a directory account.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Verifies a bearer credential and resolves it to an [`Identity`].
#[async_trait]
pub trait IdentityGate: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Decodes and validates the raw credential without touching the directory.
/// Registration and profile lookup run on this level, before an account
/// necessarily exists.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let config = get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.auth_token_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| Error::Unauthorized("invalid_token".to_string()))?;
    Ok(data.claims)
}

pub struct JwtIdentityGate {
    directory: Arc<dyn Directory>,
}

impl JwtIdentityGate {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl IdentityGate for JwtIdentityGate {
    async fn verify(&self, token: &str) -> Result<Identity> {
        let claims = decode_claims(token)?;

        let user = self
            .directory
            .find_by_external(&claims.sub)
            .await?
            .ok_or_else(|| Error::Unauthorized("unknown_account".to_string()))?;
        if !user.is_active {
            return Err(Error::Unauthorized("account_deactivated".to_string()));
        }

        // Best effort; a failed timestamp write never blocks the caller.
        if let Err(err) = self.directory.record_login(user.id).await {
            tracing::warn!("Failed to record login for {}: {:?}", user.id, err);
        }

        let display_name = user.visible_name().to_string();
        Ok(Identity {
            user_id: user.id,
            external_id: user.external_id,
            email: user.email,
            display_name,
            role: user.role,
            expires_at: Utc.timestamp_opt(claims.exp as i64, 0).single(),
        })
    }
}
