use std::sync::Arc;

use crate::clients::{
    cdn::{CloudinaryHost, ImageHost},
    functions::{FunctionsClient, HttpFunctions},
    identity::{GoTrueIdentity, IdentityProvider},
    llm::{CaptionModel, OpenAiChat},
};
use crate::config::Config;
use crate::error::Result;
use crate::middleware_layer::rate_limit::UploadRateLimiter;
use crate::repositories::plan_limits::{PlanLimitsSource, PostgrestPlanLimits};
use crate::services::plan_limits::PlanLimitsCache;

/// Collaborators the state is assembled from.
pub struct Integrations {
    pub identity: Arc<dyn IdentityProvider>,
    pub functions: Arc<dyn FunctionsClient>,
    pub plan_source: Arc<dyn PlanLimitsSource>,
    pub caption_model: Option<Arc<dyn CaptionModel>>,
    pub image_host: Option<Arc<dyn ImageHost>>,
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Identity side of the hosted backend.
    pub identity: Arc<dyn IdentityProvider>,
    /// Edge functions of the hosted backend.
    pub functions: Arc<dyn FunctionsClient>,
    /// Cached plan quotas.
    pub plan_limits: PlanLimitsCache,
    /// The upload rate limiter.
    pub upload_limiter: UploadRateLimiter,
    /// Caption model, absent when not configured.
    pub caption_model: Option<Arc<dyn CaptionModel>>,
    /// Image CDN, absent when not configured.
    pub image_host: Option<Arc<dyn ImageHost>>,
}

impl AppState {
    /// Creates a new `AppState` wired to the real backends.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("fabrica-posts/", env!("CARGO_PKG_VERSION")))
            .build()?;
        tracing::info!("✅ HTTP client initialized (timeout {:?})", config.http_timeout);

        let anon_key = config.backend_anon_key.clone();

        let caption_model = config.llm.clone().map(|llm| {
            tracing::info!("✅ Caption model configured ({})", llm.model);
            Arc::new(OpenAiChat::new(http.clone(), llm)) as Arc<dyn CaptionModel>
        });
        if caption_model.is_none() {
            tracing::warn!("⚠️ LLM_API_KEY not set, caption generation disabled");
        }

        let image_host = config.cloudinary.clone().map(|cdn| {
            tracing::info!("✅ Image CDN configured ({})", cdn.cloud_name);
            Arc::new(CloudinaryHost::new(http.clone(), cdn)) as Arc<dyn ImageHost>
        });
        if image_host.is_none() {
            tracing::warn!("⚠️ Cloudinary credentials not set, image upload disabled");
        }

        Ok(Self::from_parts(
            config,
            Integrations {
                identity: Arc::new(GoTrueIdentity::new(
                    http.clone(),
                    &config.backend_url,
                    anon_key.clone(),
                )),
                functions: Arc::new(HttpFunctions::new(
                    http.clone(),
                    &config.backend_url,
                    anon_key.clone(),
                )),
                plan_source: Arc::new(PostgrestPlanLimits::new(
                    http,
                    &config.backend_url,
                    anon_key,
                )),
                caption_model,
                image_host,
            },
        ))
    }

    /// Assembles the state from explicit collaborators.
    pub fn from_parts(config: &Config, integrations: Integrations) -> Self {
        let plan_limits = PlanLimitsCache::new(integrations.plan_source, config.plan_limits_ttl);
        tracing::info!("✅ Plan limits cache initialized (ttl {:?})", config.plan_limits_ttl);

        let upload_limiter = UploadRateLimiter::new(
            config.upload_rate_limit_max,
            config.upload_rate_limit_window,
        );
        tracing::info!(
            "✅ Upload RateLimiter initialized ({} per {:?})",
            config.upload_rate_limit_max,
            config.upload_rate_limit_window
        );

        AppState {
            config: config.clone(),
            identity: integrations.identity,
            functions: integrations.functions,
            plan_limits,
            upload_limiter,
            caption_model: integrations.caption_model,
            image_host: integrations.image_host,
        }
    }
}
