use std::fmt;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::models::user::UserRole;

/// Represents an authenticated session issued by the identity provider.
///
/// Tokens are opaque to this crate. The refresh token is the capability used
/// to rotate the session and is wiped from memory on drop.
#[derive(Clone)]
pub struct Session {
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The user's email, when the provider exposes it.
    pub email: Option<String>,
    /// The user's role in the marketplace.
    pub role: Option<UserRole>,
    /// Bearer token sent with privileged calls.
    pub access_token: String,
    /// Refresh capability.
    pub refresh_token: Zeroizing<String>,
    /// The timestamp when the session was issued.
    pub issued_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at - Utc::now() <= margin
    }

    /// Whether the session is already past its expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
