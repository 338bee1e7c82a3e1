use serde::{Deserialize, Serialize};

/// Limit value that stands for "no limit".
pub const UNLIMITED: i64 = 999_999;

/// Quotas attached to a subscription plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Unique plan key (`free`, `loja`, `pro`).
    pub plan_name: String,
    /// Posts that can be generated per month.
    pub monthly_generations: i64,
    /// Products that can be registered.
    pub max_products: i64,
    /// Factories that can be followed.
    pub max_factories_followed: i64,
    #[serde(default)]
    pub description: Option<String>,
    /// Monthly price in BRL.
    #[serde(default)]
    pub price_brl: f64,
}

impl PlanLimits {
    fn fallback(
        plan_name: &str,
        monthly_generations: i64,
        max_products: i64,
        max_factories_followed: i64,
        description: &str,
        price_brl: f64,
    ) -> Self {
        Self {
            plan_name: plan_name.to_string(),
            monthly_generations,
            max_products,
            max_factories_followed,
            description: Some(description.to_string()),
            price_brl,
        }
    }

    /// Whether the generation quota is unlimited.
    pub fn has_unlimited_generations(&self) -> bool {
        is_unlimited(self.monthly_generations)
    }

    /// Generations left this month, or `None` when unlimited.
    pub fn remaining_generations(&self, used: i64) -> Option<i64> {
        if self.has_unlimited_generations() {
            return None;
        }
        Some((self.monthly_generations - used).max(0))
    }

    /// The limits rendered for display.
    pub fn display(&self) -> PlanLimitsDisplay {
        PlanLimitsDisplay {
            monthly_generations: format_limit(self.monthly_generations),
            max_products: format_limit(self.max_products),
            max_factories_followed: format_limit(self.max_factories_followed),
            price: format!("R$ {:.2}", self.price_brl).replace('.', ","),
        }
    }

    /// Differences between this plan and `other`, by field name.
    pub fn diverging_fields(&self, other: &PlanLimits) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.monthly_generations != other.monthly_generations {
            fields.push("monthly_generations");
        }
        if self.max_products != other.max_products {
            fields.push("max_products");
        }
        if self.max_factories_followed != other.max_factories_followed {
            fields.push("max_factories_followed");
        }
        if (self.price_brl - other.price_brl).abs() > 0.005 {
            fields.push("price_brl");
        }
        fields
    }
}

/// Display strings for a plan's limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanLimitsDisplay {
    pub monthly_generations: String,
    pub max_products: String,
    pub max_factories_followed: String,
    pub price: String,
}

/// Whether a limit value is the unlimited sentinel.
pub fn is_unlimited(value: i64) -> bool {
    value == UNLIMITED
}

/// Renders a limit, using "∞" for the unlimited sentinel.
pub fn format_limit(value: i64) -> String {
    if is_unlimited(value) {
        "∞".to_string()
    } else {
        value.to_string()
    }
}

/// Plans served when the `plan_limits` table cannot be read.
///
/// Must match the rows of the table; the cache reports any divergence it sees
/// on a successful fetch.
pub fn fallback_plan_limits() -> Vec<PlanLimits> {
    vec![
        PlanLimits::fallback("free", 10, 20, 2, "Plano gratuito", 0.0),
        PlanLimits::fallback("loja", 100, 500, 10, "Plano Loja", 49.90),
        PlanLimits::fallback(
            "pro",
            UNLIMITED,
            UNLIMITED,
            UNLIMITED,
            "Plano Pro",
            99.90,
        ),
    ]
}
