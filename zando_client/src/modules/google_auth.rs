//! Client-side decoding of Google-issued identity tokens.
//!
//! Only the payload is read. Signature verification belongs to the backend;
//! the client uses the claims to show who is signed in and when the token
//! runs out.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not a JWT (expected header.payload.signature)")]
    Malformed,
    #[error("payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token has no expiry claim")]
    MissingExpiry,
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GoogleClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GoogleUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// First time this account signed in on this machine.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<GoogleClaims> for GoogleUser {
    fn from(c: GoogleClaims) -> Self {
        let email = c.email.unwrap_or_default();
        let name = c
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.clone());
        GoogleUser {
            id: c.sub,
            email,
            name,
            picture: c.picture,
            given_name: c.given_name,
            family_name: c.family_name,
            issued_at: c.iat.and_then(|s| DateTime::from_timestamp(s, 0)),
            expires_at: c.exp.and_then(|s| DateTime::from_timestamp(s, 0)),
            created_at: None,
        }
    }
}

pub fn decode_token(token: &str) -> Result<GoogleClaims, TokenError> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };
    if payload.is_empty() {
        return Err(TokenError::Malformed);
    }

    // Issuers differ on whether they pad.
    let raw = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&raw)?)
}

pub fn user_from_token(token: &str) -> Result<GoogleUser, TokenError> {
    decode_token(token).map(GoogleUser::from)
}

/// Rejects tokens that cannot be decoded, carry no `exp`, or are past it.
pub fn check_expiry(token: &str, now: DateTime<Utc>) -> Result<GoogleClaims, TokenError> {
    let claims = decode_token(token)?;
    let exp = claims.exp.ok_or(TokenError::MissingExpiry)?;
    if exp < now.timestamp() {
        let at = DateTime::from_timestamp(exp, 0).unwrap_or(now);
        return Err(TokenError::Expired(at));
    }
    Ok(claims)
}

pub fn is_token_expired(token: &str, now: DateTime<Utc>) -> bool {
    check_expiry(token, now).is_err()
}
