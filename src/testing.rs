//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sonic_rs::Value;
use tokio::sync::Notify;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::clients::functions::{FunctionsClient, RemoteError};
use crate::clients::identity::{AuthApiError, IdentityProvider, UserCheck};
use crate::error::{AppError, Result};
use crate::models::plan::PlanLimits;
use crate::models::session::Session;
use crate::repositories::plan_limits::PlanLimitsSource;
use crate::services::credentials::CredentialStore;

/// A session valid for an hour whose access token is `token`.
pub fn session(token: &str) -> Session {
    let now = Utc::now();
    Session {
        user_id: Uuid::nil(),
        email: Some("loja@example.com".to_string()),
        role: None,
        access_token: token.to_string(),
        refresh_token: Zeroizing::new(format!("{}-refresh", token)),
        issued_at: now,
        expires_at: now + Duration::hours(1),
    }
}

/// Scripted identity provider. Unscripted validations succeed and unscripted
/// refreshes hand out `refreshed-N` sessions.
#[derive(Default)]
pub struct FakeIdentity {
    get_user_script: Mutex<VecDeque<std::result::Result<Option<Session>, AuthApiError>>>,
    refresh_script: Mutex<VecDeque<std::result::Result<Session, AuthApiError>>>,
    get_user_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    clear_on_validate: Option<CredentialStore>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs the user out of `store` whenever a validation happens.
    pub fn clearing_on_validate(mut self, store: CredentialStore) -> Self {
        self.clear_on_validate = Some(store);
        self
    }

    /// Queues a validation outcome; `Ok(Some(_))` rotates the session.
    pub fn push_get_user(&self, outcome: std::result::Result<Option<Session>, AuthApiError>) {
        self.get_user_script.lock().unwrap().push_back(outcome);
    }

    pub fn push_refresh(&self, outcome: std::result::Result<Session, AuthApiError>) {
        self.refresh_script.lock().unwrap().push_back(outcome);
    }

    pub fn get_user_calls(&self) -> usize {
        self.get_user_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_user(&self, session: &Session) -> std::result::Result<UserCheck, AuthApiError> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(store) = &self.clear_on_validate {
            store.clear().await;
        }

        let scripted = self.get_user_script.lock().unwrap().pop_front();
        let rotated = match scripted {
            Some(outcome) => outcome?,
            None => None,
        };

        Ok(UserCheck {
            user_id: session.user_id,
            email: session.email.clone(),
            role: session.role,
            rotated,
        })
    }

    async fn refresh_session(&self, _refresh_token: &str) -> std::result::Result<Session, AuthApiError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let scripted = self.refresh_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(session(&format!("refreshed-{}", n))))
    }
}

/// A call recorded by `FakeFunctions`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub name: String,
    pub access_token: String,
    pub payload: String,
}

/// Scripted remote procedures. Unscripted calls answer `{"ok": true}`.
#[derive(Default)]
pub struct FakeFunctions {
    script: Mutex<VecDeque<std::result::Result<Value, RemoteError>>>,
    calls: Mutex<Vec<RecordedCall>>,
    gate: Option<std::sync::Arc<Notify>>,
}

impl FakeFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every response until `gate` is notified.
    pub fn gated(gate: std::sync::Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn push(&self, outcome: std::result::Result<Value, RemoteError>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionsClient for FakeFunctions {
    async fn invoke(
        &self,
        name: &str,
        access_token: &str,
        payload: &Value,
    ) -> std::result::Result<Value, RemoteError> {
        self.calls.lock().unwrap().push(RecordedCall {
            name: name.to_string(),
            access_token: access_token.to_string(),
            payload: sonic_rs::to_string(payload).unwrap(),
        });

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(sonic_rs::json!({ "ok": true })))
    }
}

/// Scripted `plan_limits` table. Unscripted fetches fail.
#[derive(Default)]
pub struct FakePlanSource {
    script: Mutex<VecDeque<Result<Vec<PlanLimits>>>>,
    fetches: AtomicUsize,
}

impl FakePlanSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: Result<Vec<PlanLimits>>) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanLimitsSource for FakePlanSource {
    async fn fetch_ordered(&self) -> Result<Vec<PlanLimits>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Err(AppError::Internal("plan_limits unreachable".into())))
    }
}
