use axum::{
    body::Body,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    error::AppError,
    models::{session::Session, user::UserRole},
};

/// Header carrying the refresh capability next to the bearer token.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: Uuid,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<ClaimsMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaimsMetadata {
    #[serde(default)]
    role: Option<String>,
}

/// Extracts the bearer token from the `Authorization` header.
fn extract_bearer(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Reads the claims of an access token without checking its signature.
///
/// The identity provider is the authority on validity; this only recovers
/// who the caller claims to be and when the token lapses.
///
/// # Arguments
///
/// * `access_token` - The raw JWT.
/// * `refresh_token` - The refresh token sent alongside it, if any.
///
/// # Returns
///
/// An `Option` containing the reconstructed `Session`.
pub fn session_from_token(access_token: &str, refresh_token: Option<&str>) -> Option<Session> {
    let mut segments = access_token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    segments.next()?;

    let raw = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: AccessClaims = sonic_rs::from_slice(&raw).ok()?;

    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)?;
    let issued_at = claims
        .iat
        .and_then(|iat| DateTime::<Utc>::from_timestamp(iat, 0))
        .unwrap_or_else(Utc::now);

    Some(Session {
        user_id: claims.sub,
        email: claims.email,
        role: claims
            .user_metadata
            .and_then(|m| m.role)
            .and_then(|role| UserRole::parse(&role)),
        access_token: access_token.to_string(),
        refresh_token: Zeroizing::new(refresh_token.unwrap_or_default().to_string()),
        issued_at,
        expires_at,
    })
}

/// A middleware that requires a bearer session to be present.
///
/// Expired tokens are let through: the session guard downstream refreshes
/// them with the `x-refresh-token` capability.
///
/// # Arguments
///
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or `NoActiveSession`.
pub async fn require_auth(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    tracing::debug!("🔐 Checking authentication...");

    let access_token = extract_bearer(&request).ok_or_else(|| {
        tracing::warn!("❌ No bearer token found");
        AppError::NoActiveSession
    })?;

    let refresh_token = request
        .headers()
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim);

    let session = session_from_token(access_token, refresh_token).ok_or_else(|| {
        tracing::warn!("❌ Malformed access token");
        AppError::NoActiveSession
    })?;

    tracing::debug!("🔑 Found session for user: {}", session.user_id);

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}
