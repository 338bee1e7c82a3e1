use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{error::AppError, state::AppState};

/// Accepted uploads per origin per window.
pub const UPLOAD_RATE_LIMIT_MAX: u32 = 30;
/// Length of a rate-limit window.
pub const UPLOAD_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// How often elapsed entries are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Counter of one origin's current window.
#[derive(Debug, Clone, Copy)]
pub struct WindowEntry {
    pub count: u32,
    pub reset_at: Instant,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Fixed-window limiter keyed by origin.
///
/// State lives in this process only, so several instances each enforce their
/// own budget.
#[derive(Clone)]
pub struct UploadRateLimiter {
    max_requests: u32,
    window: Duration,
    entries: Arc<Mutex<HashMap<String, WindowEntry>>>,
}

impl Default for UploadRateLimiter {
    fn default() -> Self {
        Self::new(UPLOAD_RATE_LIMIT_MAX, UPLOAD_RATE_LIMIT_WINDOW)
    }
}

impl UploadRateLimiter {
    /// Creates a new `UploadRateLimiter`.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one call from `origin` and decides whether it may proceed.
    pub async fn check(&self, origin: &str) -> RateDecision {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(origin) {
            if now < entry.reset_at {
                if entry.count < self.max_requests {
                    entry.count += 1;
                    return RateDecision::Allowed {
                        remaining: self.max_requests - entry.count,
                    };
                }
                return RateDecision::Limited {
                    retry_after: self.window,
                };
            }
        }

        entries.insert(
            origin.to_string(),
            WindowEntry {
                count: 1,
                reset_at: now + self.window,
            },
        );
        RateDecision::Allowed {
            remaining: self.max_requests.saturating_sub(1),
        }
    }

    /// Removes entries whose window has elapsed. Returns how many went.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.reset_at);
        before - entries.len()
    }

    /// Number of tracked origins.
    pub async fn tracked_origins(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Extracts the caller's IP: proxy headers first, then the peer address.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
pub fn extract_real_ip(req: &Request<Body>) -> String {
    let headers = req.headers();

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
                .map(str::to_string)
        })
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// A middleware that rate limits uploads per origin.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The upstream `Response`, or 429 with `Retry-After` when over budget.
pub async fn rate_limit_upload(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(&req);

    match state.upload_limiter.check(&ip).await {
        RateDecision::Allowed { remaining } => {
            tracing::debug!("📤 Upload accepted for {} ({} left in window)", ip, remaining);
            next.run(req).await
        }
        RateDecision::Limited { retry_after } => {
            tracing::warn!("🚫 Upload rate limit hit for {}", ip);
            AppError::RateLimited {
                retry_after_secs: retry_after.as_secs(),
            }
            .into_response()
        }
    }
}

/// Periodically sweeps elapsed windows until the process exits.
pub async fn run_sweeper(limiter: UploadRateLimiter, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let removed = limiter.sweep().await;
        tracing::debug!("🧹 Rate limiter sweep removed {} expired origins", removed);
    }
}
