use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Credentials for the OpenAI-compatible caption model.
#[derive(Clone)]
pub struct LlmConfig {
    /// The API key sent as a bearer token.
    pub api_key: Zeroizing<String>,
    /// Base URL of the chat-completions API.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
}

/// Credentials for signed Cloudinary uploads.
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: Zeroizing<String>,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Base URL of the hosted backend (auth, REST, functions).
    pub backend_url: String,
    /// Public (anon) API key of the hosted backend.
    pub backend_anon_key: Zeroizing<String>,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Timeout applied to every outbound request.
    pub http_timeout: Duration,
    /// How long a plan-limits snapshot stays fresh.
    pub plan_limits_ttl: Duration,
    /// Accepted uploads per origin per window.
    pub upload_rate_limit_max: u32,
    /// Length of the upload rate-limit window.
    pub upload_rate_limit_window: Duration,
    /// Caption model, when configured.
    pub llm: Option<LlmConfig>,
    /// Image CDN, when configured.
    pub cloudinary: Option<CloudinaryConfig>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    pub fn from_env() -> Result<Self> {
        let backend_url = env::var("BACKEND_URL")
            .context("BACKEND_URL must be set (e.g. https://<project>.supabase.co)")?
            .trim_end_matches('/')
            .to_string();

        let backend_anon_key = Zeroizing::new(
            env::var("BACKEND_ANON_KEY").context("BACKEND_ANON_KEY must be set")?,
        );

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .context("Invalid BIND_ADDR")?;

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let llm = match env::var("LLM_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(LlmConfig {
                api_key: Zeroizing::new(key),
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            }),
            _ => None,
        };

        let cloudinary = match (
            env::var("CLOUDINARY_CLOUD_NAME"),
            env::var("CLOUDINARY_API_KEY"),
            env::var("CLOUDINARY_API_SECRET"),
        ) {
            (Ok(cloud_name), Ok(api_key), Ok(api_secret))
                if !cloud_name.is_empty() && !api_key.is_empty() && !api_secret.is_empty() =>
            {
                Some(CloudinaryConfig {
                    cloud_name,
                    api_key,
                    api_secret: Zeroizing::new(api_secret),
                })
            }
            _ => None,
        };

        Ok(Self {
            bind_addr,
            backend_url,
            backend_anon_key,
            cors_origins,
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 20)?),
            plan_limits_ttl: Duration::from_secs(parse_or("PLAN_LIMITS_TTL_SECS", 300)?),
            upload_rate_limit_max: parse_or("UPLOAD_RATE_LIMIT_MAX", 30)?,
            upload_rate_limit_window: Duration::from_secs(parse_or(
                "UPLOAD_RATE_LIMIT_WINDOW_SECS",
                60,
            )?),
            llm,
            cloudinary,
        })
    }

    /// A configuration with defaults and no optional integrations, for tests.
    pub fn for_backend(backend_url: &str, anon_key: &str) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            backend_anon_key: Zeroizing::new(anon_key.to_string()),
            cors_origins: vec!["http://localhost:3000".to_string()],
            http_timeout: Duration::from_secs(20),
            plan_limits_ttl: Duration::from_secs(300),
            upload_rate_limit_max: 30,
            upload_rate_limit_window: Duration::from_secs(60),
            llm: None,
            cloudinary: None,
        }
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
