use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use sonic_rs::Value;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::clients::extract_error_message;

/// How a remote procedure call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The procedure answered with a non-2xx status.
    Http,
    /// The request never produced a response.
    Transport,
    /// The response body could not be decoded.
    Decode,
}

/// A failed remote procedure call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
    pub kind: RemoteErrorKind,
}

impl RemoteError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            kind: RemoteErrorKind::Http,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            kind: RemoteErrorKind::Transport,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            kind: RemoteErrorKind::Decode,
        }
    }

    /// Whether the procedure rejected the caller's credential.
    pub fn is_authorization_failure(&self) -> bool {
        if self.status == Some(401) {
            return true;
        }
        let message = self.message.to_lowercase();
        ["unauthorized", "401", "invalid jwt", "jwt expired"]
            .iter()
            .any(|needle| message.contains(needle))
    }
}

/// The edge-functions side of the hosted backend.
#[async_trait]
pub trait FunctionsClient: Send + Sync {
    /// Invokes the named procedure with a JSON body.
    async fn invoke(
        &self,
        name: &str,
        access_token: &str,
        payload: &Value,
    ) -> Result<Value, RemoteError>;
}

/// `FunctionsClient` posting to `{backend}/functions/v1/{name}`.
#[derive(Clone)]
pub struct HttpFunctions {
    http: reqwest::Client,
    base_url: String,
    anon_key: Zeroizing<String>,
}

impl HttpFunctions {
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: Zeroizing<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }
}

#[async_trait]
impl FunctionsClient for HttpFunctions {
    async fn invoke(
        &self,
        name: &str,
        access_token: &str,
        payload: &Value,
    ) -> Result<Value, RemoteError> {
        let body = sonic_rs::to_string(payload).map_err(|e| RemoteError::decode(e.to_string()))?;

        tracing::debug!("📡 Invoking remote procedure: {}", name);

        let response = self
            .http
            .post(format!("{}/functions/v1/{}", self.base_url, name))
            .header("apikey", self.anon_key.as_str())
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(access_token)
            .body(body)
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::http(status.as_u16(), extract_error_message(&bytes)));
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::new());
        }

        sonic_rs::from_slice(&bytes).map_err(|e| RemoteError::decode(e.to_string()))
    }
}
