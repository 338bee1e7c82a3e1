use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::clients::extract_error_message;
use crate::error::{AppError, Result};
use crate::models::plan::PlanLimits;

/// Columns read from the `plan_limits` table.
const PLAN_LIMITS_COLUMNS: &str =
    "plan_name,monthly_generations,max_products,max_factories_followed,description,price_brl";

/// Read access to the `plan_limits` table.
#[async_trait]
pub trait PlanLimitsSource: Send + Sync {
    /// All plans, ordered by monthly generations ascending.
    async fn fetch_ordered(&self) -> Result<Vec<PlanLimits>>;
}

/// `PlanLimitsSource` over the backend's PostgREST endpoint.
#[derive(Clone)]
pub struct PostgrestPlanLimits {
    http: reqwest::Client,
    base_url: String,
    anon_key: Zeroizing<String>,
}

impl PostgrestPlanLimits {
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: Zeroizing<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }
}

#[async_trait]
impl PlanLimitsSource for PostgrestPlanLimits {
    async fn fetch_ordered(&self) -> Result<Vec<PlanLimits>> {
        let response = self
            .http
            .get(format!("{}/rest/v1/plan_limits", self.base_url))
            .query(&[
                ("select", PLAN_LIMITS_COLUMNS),
                ("order", "monthly_generations.asc"),
            ])
            .header("apikey", self.anon_key.as_str())
            .bearer_auth(self.anon_key.as_str())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(AppError::RemoteProcedure {
                status: Some(status.as_u16()),
                message: format!("plan_limits query failed: {}", extract_error_message(&body)),
            });
        }

        let plans: Vec<PlanLimits> = sonic_rs::from_slice(&body)?;
        Ok(plans)
    }
}
