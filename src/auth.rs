//! Bearer-token authentication.
//!
//! Registered users present an HS256 JWT whose `user_id` claim names the
//! account. Requests without an `Authorization` header are anonymous; a header
//! that is present but invalid is rejected outright.

use anyhow::Context;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub user_id: i64,
    pub exp: i64,
    pub token_type: String,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

pub fn issue_token(user_id: i64, secret: &str, ttl: Duration) -> anyhow::Result<String> {
    let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let claims = Claims {
        user_id,
        exp: (Utc::now() + ttl).timestamp(),
        token_type: "access".to_string(),
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{header_b64}.{claims_b64}");

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).context("invalid JWT signing key")?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let invalid = || AppError::unauthorized("Invalid or expired token");

    let mut parts = token.split('.');
    let (Some(header_b64), Some(claims_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };

    let header: Header = URL_SAFE_NO_PAD
        .decode(header_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(invalid)?;
    if header.alg != "HS256" {
        return Err(invalid());
    }

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|_| invalid())?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| invalid())?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let claims: Claims = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(invalid)?;

    if claims.exp <= Utc::now().timestamp() {
        return Err(invalid());
    }

    Ok(claims)
}

/// Resolves the requesting user, if any.
pub fn bearer_user(headers: &HeaderMap, secret: &str) -> Result<Option<i64>, AppError> {
    let Some(value) = headers.get("authorization") else {
        return Ok(None);
    };

    let auth = value
        .to_str()
        .map_err(|_| AppError::unauthorized("Invalid authorization header"))?;
    let token = auth
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("Invalid authorization header"))?;

    decode_token(token.trim(), secret).map(|claims| Some(claims.user_id))
}

/// Static-token check for the admin API.
pub fn check_admin(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::unauthorized("unauthorized"));
    }
    Ok(())
}
