use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fabrica_posts::{
    config::Config,
    handlers::functions::ACCESS_TOKEN_HEADER,
    middleware_layer::{
        auth::REFRESH_TOKEN_HEADER,
        rate_limit::{SWEEP_INTERVAL, run_sweeper},
    },
    router,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config)?;
    tracing::info!("✅ AppState initialized");

    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin {}", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let refresh_header = HeaderName::from_static(REFRESH_TOKEN_HEADER);
    let access_header = HeaderName::from_static(ACCESS_TOKEN_HEADER);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            refresh_header.clone(),
        ])
        .expose_headers([access_header, refresh_header, header::RETRY_AFTER])
        .max_age(Duration::from_secs(86400));

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .context("Invalid governor configuration")?,
    );

    let app = router::build(state.clone())
        .layer(GovernorLayer::new(governor_conf))
        .layer(cors);

    let limiter = state.upload_limiter.clone();
    tokio::spawn(run_sweeper(limiter, SWEEP_INTERVAL));

    let addr: SocketAddr = config.bind_addr;
    tracing::info!("🚀 Server listening on http://{}", addr);
    tracing::info!("✅ Upload rate limiter sweep started (every {:?})", SWEEP_INTERVAL);
    tracing::info!("✅ All systems operational");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
