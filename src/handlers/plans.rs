use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::{
    error::Result,
    models::{
        plan::{PlanLimits, PlanLimitsDisplay},
        session::Session,
    },
    services::{credentials::CredentialStore, session_guard::ensure_fresh_session},
    state::AppState,
};

/// A plan together with its display strings.
#[derive(Debug, Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub limits: PlanLimits,
    pub display: PlanLimitsDisplay,
}

impl From<PlanLimits> for PlanView {
    fn from(limits: PlanLimits) -> Self {
        let display = limits.display();
        Self { limits, display }
    }
}

/// Lists every plan, ordered by quota.
pub async fn list_plans(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let plans: Vec<PlanView> = state
        .plan_limits
        .get_all_plan_limits()
        .await
        .into_iter()
        .map(PlanView::from)
        .collect();

    tracing::debug!("📋 Listing {} plans", plans.len());

    Ok((StatusCode::OK, Json(plans)))
}

/// Returns one plan. Unknown names resolve to the lowest tier.
pub async fn get_plan(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let plan = state.plan_limits.get_plan_limit(name.trim()).await;

    Ok((StatusCode::OK, Json(PlanView::from(plan))))
}

/// Drops the cached plans so the next read hits the table.
///
/// The bearer session is validated with the identity provider first;
/// `require_auth` only decodes it.
pub async fn invalidate_plans(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse> {
    let credentials = CredentialStore::with_session(session);
    let session = ensure_fresh_session(&credentials, state.identity.as_ref()).await?;

    state.plan_limits.invalidate_plan_limits_cache().await;
    tracing::info!("🧹 Plan limits cache invalidated by user {}", session.user_id);

    Ok(StatusCode::NO_CONTENT)
}
