// src/services/authenticator.rs
//! Resolves the calling [`Actor`] from an HS256 bearer token.
//!
//! A request without an `Authorization` header is anonymous, which is all the
//! public verification endpoint needs. A header that is present but invalid is
//! rejected rather than silently downgraded to anonymous.

use crate::error::CertificateError;
use crate::models::actor::Actor;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Token claims. `sub` is the actor id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

pub struct TokenAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn actor_from_headers(&self, headers: &HeaderMap) -> Result<Actor, CertificateError> {
        let value = match headers.get(AUTHORIZATION) {
            Some(value) => value,
            None => return Ok(Actor::Anonymous),
        };

        let token = value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CertificateError::Unauthorized)?;

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            log::debug!("rejected bearer token: {}", e);
            CertificateError::Unauthorized
        })?;

        let subject = data.claims.sub.trim();
        if subject.is_empty() {
            return Err(CertificateError::Unauthorized);
        }
        Ok(Actor::user(subject))
    }
}

#[cfg(test)]
pub(crate) fn token_for(secret: &str, subject: &str) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: subject.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
