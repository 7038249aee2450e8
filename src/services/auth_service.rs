use std::future::Future;
use std::pin::Pin;

use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::models::Identity;

/// Why a credential was refused. Any of these rejects the handshake.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("no JWT secret configured")]
    NotConfigured,

    #[error("JWT validation failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("unsupported token type '{0}'")]
    UnsupportedTokenType(String),
}

pub type VerifyFuture<'a> = Pin<Box<dyn Future<Output = Result<Identity, AuthError>> + Send + 'a>>;

/// Resolves a bearer credential to a user identity. Called once per
/// connection attempt.
pub trait IdentityVerifier: Send + Sync {
    fn verify<'a>(&'a self, credential: &'a str) -> VerifyFuture<'a>;
}

#[derive(Debug, Clone, Deserialize)]
struct UserClaims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    token_type: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

/// Verifies HS256 tokens signed with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    secret: Option<String>,
}

impl JwtVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn identity_from_token(&self, token: &str) -> Result<Identity, AuthError> {
        let secret = self.secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let token_data = validate_jwt(token, secret)?;
        let claims = token_data.claims;

        if let Some(token_type) = claims.token_type.filter(|t| t != "user") {
            return Err(AuthError::UnsupportedTokenType(token_type));
        }

        info!(user_id = %claims.sub, "JWT token validated successfully");
        Ok(Identity {
            display_name: claims.name.unwrap_or_else(|| claims.sub.clone()),
            user_id: claims.sub,
            roles: claims.roles,
        })
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify<'a>(&'a self, credential: &'a str) -> VerifyFuture<'a> {
        Box::pin(async move { self.identity_from_token(credential) })
    }
}

// Validate a JWT token and return the token data
fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<UserClaims>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<UserClaims>(token, &decoding_key, &validation)
}

// Get the auth token from the request headers, falling back to a query
// parameter (browsers can't set headers on a WebSocket handshake).
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, AuthError> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::MissingCredential("invalid Authorization header".to_string()))?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = headers.get(http::header::COOKIE) {
        let cookie_str = cookie_header
            .to_str()
            .map_err(|_| AuthError::MissingCredential("invalid Cookie header".to_string()))?;
        for cookie in cookie::Cookie::split_parse(cookie_str).flatten() {
            if cookie.name() == "auth_token" {
                return Ok(cookie.value().to_string());
            }
        }
    }

    // 3. Try the query string
    match query_token {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AuthError::MissingCredential(
            "no Authorization header, auth_token cookie or token parameter".to_string(),
        )),
    }
}
