use crate::clients::identity::IdentityProvider;
use crate::error::{AppError, Result};
use crate::models::session::Session;
use crate::services::credentials::CredentialStore;

/// Guarantees that the stored credential is one the identity provider
/// currently accepts.
///
/// Reads the cached session (failing with `NoActiveSession` without any
/// network call when there is none), validates it server-side, and on a
/// failed validation attempts exactly one explicit refresh. Returns the
/// session as stored after validation; a session that vanished meanwhile
/// yields `SessionLost`.
pub async fn ensure_fresh_session(
    credentials: &CredentialStore,
    identity: &dyn IdentityProvider,
) -> Result<Session> {
    let session = credentials
        .current()
        .await
        .ok_or(AppError::NoActiveSession)?;

    match identity.get_user(&session).await {
        Ok(check) => {
            if let Some(rotated) = check.rotated {
                tracing::debug!("🔄 Session rotated during validation for {}", check.user_id);
                credentials.replace(rotated).await;
            }
        }
        Err(validation_error) => {
            tracing::warn!(
                "⚠️ Session validation failed for {}: {}, attempting refresh",
                session.user_id,
                validation_error
            );

            match identity.refresh_session(&session.refresh_token).await {
                Ok(refreshed) => credentials.replace(refreshed).await,
                Err(refresh_error) => {
                    tracing::warn!(
                        "❌ Session refresh failed for {}: {}",
                        session.user_id,
                        refresh_error
                    );
                    return Err(AppError::SessionExpired(refresh_error.to_string()));
                }
            }
        }
    }

    credentials.current().await.ok_or(AppError::SessionLost)
}
