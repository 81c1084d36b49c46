//! Access tokens
//!
//! HS256 JWTs whose subject is the user id. A token only proves who signed
//! in; the caller still has to exist when it is presented.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id, decimal
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issues and verifies access tokens with one shared secret.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Build from the auth config section.
    ///
    /// Without a configured secret a random one is generated, so tokens stop
    /// verifying when the process restarts.
    pub fn from_config(config: &AuthConfig) -> Self {
        let ttl = Duration::hours(config.token_ttl_hours);
        if config.jwt_secret.is_empty() {
            tracing::warn!("No JWT secret configured, generating a random one for this process");
            let secret = format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple());
            Self::new(secret.as_bytes(), ttl)
        } else {
            Self::new(config.jwt_secret.as_bytes(), ttl)
        }
    }

    /// Sign a token for `user_id`
    pub fn issue(&self, user_id: i64) -> Result<String> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .context("Token lifetime overflows the expiry timestamp")?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).context("Failed to sign token")
    }

    /// User id carried by a valid, unexpired token
    pub fn verify(&self, token: &str) -> Option<i64> {
        let data = match decode::<Claims>(token, &self.decoding_key, &Validation::default()) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("Rejected token: {}", e);
                return None;
            }
        };
        data.claims.sub.parse().ok()
    }
}
