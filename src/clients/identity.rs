use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use http::header::CONTENT_TYPE;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::clients::extract_error_message;
use crate::models::{session::Session, user::UserRole};

/// How close to expiry a session must be before validation rotates it.
pub const ROTATE_MARGIN_SECS: i64 = 60;

/// Failures reported by the identity provider.
#[derive(Debug, Error)]
pub enum AuthApiError {
    /// The provider answered and rejected the credential.
    #[error("credential rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The provider could not be reached.
    #[error("identity provider unreachable: {0}")]
    Transport(String),
    /// The provider answered with something unreadable.
    #[error("malformed identity response: {0}")]
    Decode(String),
}

/// Result of a server-side identity check.
#[derive(Debug, Clone)]
pub struct UserCheck {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    /// Set when the check rotated the credential on the way.
    pub rotated: Option<Session>,
}

/// The identity side of the hosted backend.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Validates the session with the provider, rotating it first if it is
    /// about to expire.
    async fn get_user(&self, session: &Session) -> Result<UserCheck, AuthApiError>;

    /// Exchanges a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthApiError>;
}

#[derive(Debug, Deserialize)]
struct UserResource {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    role: Option<String>,
}

impl UserResource {
    fn role(&self) -> Option<UserRole> {
        self.user_metadata
            .as_ref()
            .and_then(|m| m.role.as_deref())
            .and_then(UserRole::parse)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResource {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResource,
}

impl TokenResource {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));

        Session {
            user_id: self.user.id,
            email: self.user.email.clone(),
            role: self.user.role(),
            access_token: self.access_token,
            refresh_token: Zeroizing::new(self.refresh_token),
            issued_at: now,
            expires_at,
        }
    }
}

/// `IdentityProvider` over the backend's GoTrue-compatible REST API.
#[derive(Clone)]
pub struct GoTrueIdentity {
    http: reqwest::Client,
    base_url: String,
    anon_key: Zeroizing<String>,
}

impl GoTrueIdentity {
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: Zeroizing<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }

    async fn read<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, AuthApiError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(AuthApiError::Rejected {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        sonic_rs::from_slice(&body).map_err(|e| AuthApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for GoTrueIdentity {
    async fn get_user(&self, session: &Session) -> Result<UserCheck, AuthApiError> {
        let mut rotated = None;
        let mut access_token = session.access_token.clone();

        if session.expires_within(Duration::seconds(ROTATE_MARGIN_SECS)) {
            tracing::debug!("🔄 Session for {} is about to expire, rotating", session.user_id);
            let fresh = self.refresh_session(&session.refresh_token).await?;
            access_token = fresh.access_token.clone();
            rotated = Some(fresh);
        }

        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", self.anon_key.as_str())
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(|e| AuthApiError::Transport(e.to_string()))?;

        let user: UserResource = Self::read(response).await?;
        let role = user.role();

        Ok(UserCheck {
            user_id: user.id,
            email: user.email,
            role,
            rotated,
        })
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthApiError> {
        let body = sonic_rs::to_string(&sonic_rs::json!({ "refresh_token": refresh_token }))
            .map_err(|e| AuthApiError::Decode(e.to_string()))?;

        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=refresh_token",
                self.base_url
            ))
            .header("apikey", self.anon_key.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AuthApiError::Transport(e.to_string()))?;

        let tokens: TokenResource = Self::read(response).await?;
        let session = tokens.into_session(Utc::now());

        tracing::info!("✅ Session refreshed for user: {}", session.user_id);
        Ok(session)
    }
}
