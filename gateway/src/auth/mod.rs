//! Principal authentication for gateway admission.
//!
//! Credentials arrive as `Authorization: Bearer <token>` or `X-API-Key`.
//! Tokens are self-contained HS256 JWTs signed with a shared secret; claims
//! carry at minimum the principal identifier. A distinguished development
//! credential can be configured and must be disabled in production.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

/// The authenticated identity a request is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("invalid authorization header format")]
    InvalidFormat,
    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// JWT claims.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
}

/// Validates self-contained tokens against the shared secret.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    dev_token: Option<String>,
    allow_anonymous: bool,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            dev_token: config.dev_token.clone(),
            allow_anonymous: config.allow_anonymous,
        }
    }

    /// Authenticate a request from its headers.
    ///
    /// When anonymous access is allowed, a credential-less request is
    /// attributed to the client's network identity instead.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let credential = match extract_credential(headers)? {
            Some(c) => c,
            None => {
                if self.allow_anonymous {
                    return Ok(Principal {
                        id: client_identity(headers),
                    });
                }
                return Err(AuthError::MissingCredentials);
            }
        };

        if let Some(dev_token) = &self.dev_token {
            if credential == *dev_token {
                return Ok(Principal {
                    id: "dev-user".to_string(),
                });
            }
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let token_data = decode::<Claims>(&credential, &self.decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(Principal {
            id: token_data.claims.sub,
        })
    }
}

/// Pull the credential out of the headers, if any.
fn extract_credential(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    if let Some(value) = headers.get("authorization") {
        let value = value.to_str().map_err(|_| AuthError::InvalidFormat)?;
        let token = value.strip_prefix("Bearer ").unwrap_or(value);
        if token.is_empty() {
            return Err(AuthError::InvalidFormat);
        }
        return Ok(Some(token.to_string()));
    }

    if let Some(value) = headers.get("x-api-key") {
        let value = value.to_str().map_err(|_| AuthError::InvalidFormat)?;
        if value.is_empty() {
            return Err(AuthError::InvalidFormat);
        }
        return Ok(Some(value.to_string()));
    }

    Ok(None)
}

/// Fallback identity for unauthenticated access: the nearest client address
/// we can see.
fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}
