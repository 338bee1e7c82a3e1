use axum::{
    Extension,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use sonic_rs::Value;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::REFRESH_TOKEN_HEADER,
    models::session::Session,
    services::{credentials::CredentialStore, remote_call::RemoteCaller},
    state::AppState,
};

#[derive(Serialize)]
struct Envelope<'a> {
    data: Option<&'a Value>,
    error: Option<String>,
}

/// Header carrying a rotated access token back to the client.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// Validates a remote procedure name: lowercase letters, digits and dashes.
pub fn validate_function_name(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');

    if valid {
        Ok(name)
    } else {
        Err(AppError::Validation(format!("Invalid function name '{}'", name)))
    }
}

fn parse_payload(body: &[u8]) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(sonic_rs::json!({}));
    }
    sonic_rs::from_slice(body).map_err(|e| AppError::Validation(format!("Invalid JSON body: {}", e)))
}

/// Relays a privileged call to the backend's edge functions.
///
/// The caller's session is validated (and refreshed once if rejected)
/// before anything is sent. The body is always `{data, error}`; rotated
/// tokens come back in `x-access-token` / `x-refresh-token`.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session` - The session decoded by `require_auth`.
/// * `name` - The procedure to call.
/// * `body` - The JSON payload, forwarded unchanged.
pub async fn invoke_function(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let name = validate_function_name(&name)?;
    let payload = parse_payload(&body)?;

    tracing::info!("⚡ Invoking {} for user {}", name, session.user_id);

    let credentials = CredentialStore::with_session(session);
    let caller = RemoteCaller::new(
        credentials.clone(),
        state.identity.clone(),
        state.functions.clone(),
    );

    let outcome = caller.invoke_with_auth(name, &payload).await;

    let null = Value::new();
    let (status, envelope) = match &outcome.error {
        None => (
            StatusCode::OK,
            Envelope {
                data: Some(outcome.data.as_ref().unwrap_or(&null)),
                error: None,
            },
        ),
        Some(error) => {
            tracing::warn!("❌ {} failed: {}", name, error);
            (
                error.status(),
                Envelope {
                    data: None,
                    error: Some(error.public_message()),
                },
            )
        }
    };

    let mut response = (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        sonic_rs::to_string(&envelope)?,
    )
        .into_response();

    if credentials.rotations() > 0 {
        if let Some(rotated) = credentials.current().await {
            tracing::debug!("🔄 Returning rotated tokens for user {}", rotated.user_id);
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&rotated.access_token) {
                headers.insert(ACCESS_TOKEN_HEADER, value);
            }
            if let Ok(value) = HeaderValue::from_str(&rotated.refresh_token) {
                headers.insert(REFRESH_TOKEN_HEADER, value);
            }
        }
    }

    Ok(response)
}
