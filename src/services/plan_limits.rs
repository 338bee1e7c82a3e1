use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::models::plan::{PlanLimits, fallback_plan_limits};
use crate::repositories::plan_limits::PlanLimitsSource;

/// Default freshness window of a snapshot.
pub const PLAN_LIMITS_TTL: Duration = Duration::from_secs(5 * 60);

struct Snapshot {
    plans: Vec<PlanLimits>,
    fetched_at: Instant,
}

/// A plan that differs between the table and the static fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDivergence {
    pub plan_name: String,
    /// Differing fields; empty when the plan is missing on one side.
    pub fields: Vec<&'static str>,
}

/// Read-through, time-boxed cache over the `plan_limits` table.
///
/// Readers racing a refresh may see either snapshot. Errors from the table
/// never reach callers; they get the static fallback instead.
#[derive(Clone)]
pub struct PlanLimitsCache {
    source: Arc<dyn PlanLimitsSource>,
    ttl: Duration,
    snapshot: Arc<RwLock<Option<Snapshot>>>,
}

impl PlanLimitsCache {
    pub fn new(source: Arc<dyn PlanLimitsSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    /// All plans, ordered by quota.
    pub async fn get_all_plan_limits(&self) -> Vec<PlanLimits> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            if snapshot.fetched_at.elapsed() < self.ttl {
                return snapshot.plans.clone();
            }
        }

        match self.source.fetch_ordered().await {
            Ok(plans) if !plans.is_empty() => {
                for divergence in fallback_divergence(&plans) {
                    tracing::warn!(
                        "⚠️ Fallback plan table diverges from plan_limits for {}: {:?}",
                        divergence.plan_name,
                        divergence.fields
                    );
                }

                let mut snapshot = self.snapshot.write().await;
                *snapshot = Some(Snapshot {
                    plans: plans.clone(),
                    fetched_at: Instant::now(),
                });
                tracing::debug!("✅ Plan limits cached ({} plans)", plans.len());
                plans
            }
            Ok(_) => {
                tracing::warn!("⚠️ plan_limits table is empty, using fallback plans");
                fallback_plan_limits()
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to load plan_limits, using fallback plans: {}", e);
                fallback_plan_limits()
            }
        }
    }

    /// One plan by name. Unknown names get the lowest tier.
    pub async fn get_plan_limit(&self, plan_name: &str) -> PlanLimits {
        if let Some(plan) = self
            .get_all_plan_limits()
            .await
            .into_iter()
            .find(|plan| plan.plan_name == plan_name)
        {
            return plan;
        }

        tracing::debug!("Unknown plan {:?}, using lowest tier", plan_name);
        lowest_fallback_tier()
    }

    /// Forgets the snapshot so the next read queries the table.
    pub async fn invalidate_plan_limits_cache(&self) {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = None;
        tracing::debug!("🧹 Plan limits cache invalidated");
    }
}

fn lowest_fallback_tier() -> PlanLimits {
    let mut fallback = fallback_plan_limits();
    fallback.remove(0)
}

/// Compares fetched plans with the static fallback table.
pub fn fallback_divergence(fetched: &[PlanLimits]) -> Vec<PlanDivergence> {
    let fallback = fallback_plan_limits();
    let mut divergences = Vec::new();

    for expected in &fallback {
        match fetched.iter().find(|p| p.plan_name == expected.plan_name) {
            Some(actual) => {
                let fields = expected.diverging_fields(actual);
                if !fields.is_empty() {
                    divergences.push(PlanDivergence {
                        plan_name: expected.plan_name.clone(),
                        fields,
                    });
                }
            }
            None => divergences.push(PlanDivergence {
                plan_name: expected.plan_name.clone(),
                fields: Vec::new(),
            }),
        }
    }

    for actual in fetched {
        if !fallback.iter().any(|p| p.plan_name == actual.plan_name) {
            divergences.push(PlanDivergence {
                plan_name: actual.plan_name.clone(),
                fields: Vec::new(),
            });
        }
    }

    divergences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::plan::format_limit;
    use crate::testing::FakePlanSource;

    fn remote_plans() -> Vec<PlanLimits> {
        let mut plans = fallback_plan_limits();
        plans[1].max_products = 800;
        plans
    }

    fn cache(source: &Arc<FakePlanSource>) -> PlanLimitsCache {
        PlanLimitsCache::new(source.clone(), PLAN_LIMITS_TTL)
    }

    #[tokio::test(start_paused = true)]
    async fn reads_within_ttl_query_once() {
        let source = Arc::new(FakePlanSource::new());
        source.push(Ok(remote_plans()));
        let cache = cache(&source);

        let first = cache.get_all_plan_limits().await;
        tokio::time::advance(Duration::from_secs(299)).await;
        let second = cache.get_all_plan_limits().await;

        assert_eq!(source.fetches(), 1);
        assert_eq!(first, second);
        assert_eq!(second[1].max_products, 800);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_snapshot_queries_again() {
        let source = Arc::new(FakePlanSource::new());
        source.push(Ok(remote_plans()));
        source.push(Ok(fallback_plan_limits()));
        let cache = cache(&source);

        cache.get_all_plan_limits().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        let refreshed = cache.get_all_plan_limits().await;

        assert_eq!(source.fetches(), 2);
        assert_eq!(refreshed[1].max_products, 500);
    }

    #[tokio::test]
    async fn query_error_returns_fallback() {
        let source = Arc::new(FakePlanSource::new());
        source.push(Err(AppError::Internal("connection refused".into())));
        let cache = cache(&source);

        let plans = cache.get_all_plan_limits().await;

        let names: Vec<_> = plans.iter().map(|p| p.plan_name.as_str()).collect();
        assert_eq!(names, ["free", "loja", "pro"]);
        assert_eq!(format_limit(plans[2].monthly_generations), "∞");
    }

    #[tokio::test]
    async fn empty_table_returns_fallback_and_is_not_cached() {
        let source = Arc::new(FakePlanSource::new());
        source.push(Ok(Vec::new()));
        source.push(Ok(remote_plans()));
        let cache = cache(&source);

        assert_eq!(cache.get_all_plan_limits().await, fallback_plan_limits());
        assert_eq!(cache.get_all_plan_limits().await[1].max_products, 800);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_query() {
        let source = Arc::new(FakePlanSource::new());
        source.push(Ok(remote_plans()));
        source.push(Ok(remote_plans()));
        let cache = cache(&source);

        cache.get_all_plan_limits().await;
        cache.invalidate_plan_limits_cache().await;
        cache.get_all_plan_limits().await;

        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn plan_lookup_falls_back_to_lowest_tier() {
        let source = Arc::new(FakePlanSource::new());
        source.push(Ok(remote_plans()));
        let cache = cache(&source);

        assert_eq!(cache.get_plan_limit("loja").await.max_products, 800);
        assert_eq!(cache.get_plan_limit("enterprise").await.plan_name, "free");
        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn divergence_reports_changed_missing_and_extra_plans() {
        let mut fetched = remote_plans();
        fetched.remove(0);
        fetched.push(PlanLimits {
            plan_name: "enterprise".into(),
            ..fallback_plan_limits()[2].clone()
        });

        let divergences = fallback_divergence(&fetched);

        assert_eq!(
            divergences,
            vec![
                PlanDivergence { plan_name: "free".into(), fields: vec![] },
                PlanDivergence { plan_name: "loja".into(), fields: vec!["max_products"] },
                PlanDivergence { plan_name: "enterprise".into(), fields: vec![] },
            ]
        );
    }

    #[test]
    fn matching_table_has_no_divergence() {
        assert!(fallback_divergence(&fallback_plan_limits()).is_empty());
    }
}
