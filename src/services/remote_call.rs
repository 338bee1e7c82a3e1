use std::sync::Arc;

use sonic_rs::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::clients::functions::{FunctionsClient, RemoteError, RemoteErrorKind};
use crate::clients::identity::IdentityProvider;
use crate::error::{AppError, Result};
use crate::services::credentials::CredentialStore;
use crate::services::session_guard::ensure_fresh_session;

/// Position in the retry-once cycle of a single invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// First attempt.
    Initial,
    /// The one allowed retry.
    Retrying,
    Done,
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Refresh the credential and call again.
    Retry,
    /// Hand the attempt's outcome to the caller.
    Finish,
}

impl CallState {
    /// Moves past an attempt. Only an authorization failure on the first
    /// attempt leads to `Retry`; every other path ends in `Done`.
    pub fn advance(&mut self, authorization_failure: bool) -> Transition {
        match (*self, authorization_failure) {
            (CallState::Initial, true) => {
                *self = CallState::Retrying;
                Transition::Retry
            }
            _ => {
                *self = CallState::Done;
                Transition::Finish
            }
        }
    }
}

/// `{data, error}` pair returned by [`RemoteCaller::invoke_with_auth`].
#[derive(Debug)]
pub struct InvokeOutcome {
    pub data: Option<Value>,
    pub error: Option<AppError>,
}

impl InvokeOutcome {
    pub fn into_result(self) -> Result<Value> {
        match (self.data, self.error) {
            (_, Some(error)) => Err(error),
            (Some(data), None) => Ok(data),
            (None, None) => Ok(Value::new()),
        }
    }
}

impl From<Result<Value>> for InvokeOutcome {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(data) => Self {
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                data: None,
                error: Some(error),
            },
        }
    }
}

/// Invokes privileged remote procedures under a validated session.
#[derive(Clone)]
pub struct RemoteCaller {
    credentials: CredentialStore,
    identity: Arc<dyn IdentityProvider>,
    functions: Arc<dyn FunctionsClient>,
}

impl RemoteCaller {
    pub fn new(
        credentials: CredentialStore,
        identity: Arc<dyn IdentityProvider>,
        functions: Arc<dyn FunctionsClient>,
    ) -> Self {
        Self {
            credentials,
            identity,
            functions,
        }
    }

    /// The store this caller reads and rotates.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Calls `name` with `payload` once the session is validated.
    ///
    /// An authorization failure triggers one refresh, one re-validation and
    /// one retry with the same payload. Nothing is called without a
    /// validated session.
    pub async fn invoke(&self, name: &str, payload: &Value) -> Result<Value> {
        self.invoke_inner(name, payload, None).await
    }

    /// Same contract as [`invoke`](Self::invoke), reported as a pair.
    pub async fn invoke_with_auth(&self, name: &str, payload: &Value) -> InvokeOutcome {
        self.invoke(name, payload).await.into()
    }

    async fn invoke_inner(
        &self,
        name: &str,
        payload: &Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        let session = ensure_fresh_session(&self.credentials, self.identity.as_ref()).await?;
        let mut access_token = session.access_token;
        let mut state = CallState::Initial;

        loop {
            if is_cancelled(cancel) {
                return Err(AppError::Cancelled);
            }

            let outcome = self.functions.invoke(name, &access_token, payload).await;
            let authorization_failure =
                matches!(&outcome, Err(e) if e.is_authorization_failure());

            let original = match state.advance(authorization_failure) {
                Transition::Finish => return outcome.map_err(|e| classify(name, e)),
                Transition::Retry => match outcome {
                    Err(e) => e,
                    Ok(data) => return Ok(data),
                },
            };

            tracing::warn!(
                "🔐 Procedure {} rejected the credential ({}), refreshing and retrying once",
                name,
                original
            );

            if is_cancelled(cancel) {
                return Err(AppError::Cancelled);
            }

            access_token = self.recover(&original).await?;
        }
    }

    /// Explicit refresh followed by re-validation. Returns the token to retry
    /// with.
    async fn recover(&self, original: &RemoteError) -> Result<String> {
        let current = self
            .credentials
            .current()
            .await
            .ok_or(AppError::NoActiveSession)?;

        match self.identity.refresh_session(&current.refresh_token).await {
            Ok(refreshed) => self.credentials.replace(refreshed).await,
            Err(e) => {
                tracing::warn!("❌ Refresh during recovery failed: {}", e);
                return Err(AppError::AuthorizationFailed(original.message.clone()));
            }
        }

        let session = ensure_fresh_session(&self.credentials, self.identity.as_ref()).await?;
        Ok(session.access_token)
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

fn classify(name: &str, error: RemoteError) -> AppError {
    if error.is_authorization_failure() {
        return AppError::AuthorizationFailed(error.message);
    }

    match error.kind {
        RemoteErrorKind::Http => AppError::RemoteProcedure {
            status: error.status,
            message: error.message,
        },
        RemoteErrorKind::Transport | RemoteErrorKind::Decode => {
            AppError::Unexpected(format!("{}: {}", name, error.message))
        }
    }
}

/// Observable state of an [`AutoFetch`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchState {
    pub loading: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

/// A remote call bound to the lifetime of an owning context.
///
/// Once the context is torn down ([`cancel`](Self::cancel)), no step mutates
/// the state and results are discarded. In-flight requests are not aborted.
#[derive(Clone, Default)]
pub struct AutoFetch {
    state: Arc<RwLock<FetchState>>,
    cancel: CancellationToken,
}

impl AutoFetch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetch torn down together with `parent`.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            state: Arc::default(),
            cancel: parent.child_token(),
        }
    }

    /// Tears the owning context down.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn snapshot(&self) -> FetchState {
        self.state.read().await.clone()
    }

    /// Runs one invocation. Returns `None` when torn down before the result
    /// could be published.
    pub async fn run(
        &self,
        caller: &RemoteCaller,
        name: &str,
        payload: &Value,
    ) -> Option<Result<Value>> {
        {
            let mut state = self.state.write().await;
            if self.cancel.is_cancelled() {
                return None;
            }
            state.loading = true;
        }

        let result = caller.invoke_inner(name, payload, Some(&self.cancel)).await;

        let mut state = self.state.write().await;
        if self.cancel.is_cancelled() {
            tracing::debug!("🗑️ Discarding result of {} after teardown", name);
            return None;
        }

        state.loading = false;
        match &result {
            Ok(data) => {
                state.data = Some(data.clone());
                state.error = None;
            }
            Err(e) => {
                state.error = Some(e.public_message());
            }
        }

        Some(result)
    }
}
