use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use zeroize::Zeroizing;

use fabrica_posts::{
    clients::{
        cdn::ImageHost,
        functions::{FunctionsClient, RemoteError},
        identity::{AuthApiError, IdentityProvider, UserCheck},
        llm::CaptionModel,
    },
    config::Config,
    error::{AppError, Result},
    models::{
        plan::{PlanLimits, fallback_plan_limits},
        session::Session,
        upload::{ImageUpload, UploadedImage},
    },
    repositories::plan_limits::PlanLimitsSource,
    router,
    state::{AppState, Integrations},
};

const USER: &str = "7f0c2a4e-3b7d-4c55-9a65-0d1f8f6b9e21";
const BOUNDARY: &str = "fabrica-boundary";

const PNG_HEADER: [u8; 16] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
];

/// Accepts every credential; refreshes hand out `fresh-token`.
struct AcceptingIdentity;

#[async_trait]
impl IdentityProvider for AcceptingIdentity {
    async fn get_user(&self, session: &Session) -> std::result::Result<UserCheck, AuthApiError> {
        Ok(UserCheck {
            user_id: session.user_id,
            email: session.email.clone(),
            role: session.role,
            rotated: None,
        })
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<Session, AuthApiError> {
        if refresh_token.is_empty() {
            return Err(AuthApiError::Rejected {
                status: 400,
                message: "refresh token missing".into(),
            });
        }
        let now = Utc::now();
        Ok(Session {
            user_id: Uuid::parse_str(USER).unwrap_or_default(),
            email: None,
            role: None,
            access_token: "fresh-token".into(),
            refresh_token: Zeroizing::new("fresh-refresh".into()),
            issued_at: now,
            expires_at: now + Duration::hours(1),
        })
    }
}

/// Rejects every credential, as the provider does for forged tokens.
struct RejectingIdentity;

#[async_trait]
impl IdentityProvider for RejectingIdentity {
    async fn get_user(&self, _session: &Session) -> std::result::Result<UserCheck, AuthApiError> {
        Err(AuthApiError::Rejected {
            status: 401,
            message: "invalid JWT: unable to parse or verify signature".into(),
        })
    }

    async fn refresh_session(
        &self,
        _refresh_token: &str,
    ) -> std::result::Result<Session, AuthApiError> {
        Err(AuthApiError::Rejected {
            status: 400,
            message: "Invalid Refresh Token".into(),
        })
    }
}

/// Rejects every token except `fresh-token` with a 401.
#[derive(Default)]
struct PickyFunctions {
    tokens: Mutex<Vec<String>>,
}

#[async_trait]
impl FunctionsClient for PickyFunctions {
    async fn invoke(
        &self,
        name: &str,
        access_token: &str,
        _payload: &sonic_rs::Value,
    ) -> std::result::Result<sonic_rs::Value, RemoteError> {
        self.tokens.lock().unwrap().push(access_token.to_string());
        match (name, access_token) {
            ("missing-factory", _) => Err(RemoteError::http(404, "factory not found")),
            (_, "fresh-token") => Ok(sonic_rs::json!({ "followed": true })),
            _ => Err(RemoteError::http(401, "Invalid JWT")),
        }
    }
}

struct TablePlans(Vec<PlanLimits>, Arc<AtomicUsize>);

#[async_trait]
impl PlanLimitsSource for TablePlans {
    async fn fetch_ordered(&self) -> Result<Vec<PlanLimits>> {
        self.1.fetch_add(1, Ordering::SeqCst);
        if self.0.is_empty() {
            return Err(AppError::Internal("relation plan_limits does not exist".into()));
        }
        Ok(self.0.clone())
    }
}

struct EchoHost;

#[async_trait]
impl ImageHost for EchoHost {
    async fn upload(&self, image: ImageUpload) -> Result<UploadedImage> {
        let public_id = format!("{}/{}", image.folder.remote_path(), image.filename);
        Ok(UploadedImage {
            url: format!("https://cdn.example/{}", public_id),
            public_id,
            width: 1,
            height: 1,
            format: "png".into(),
            bytes: image.data.len() as u64,
        })
    }
}

struct CannedModel;

#[async_trait]
impl CaptionModel for CannedModel {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        Ok("Chegou novidade na loja! #moda".into())
    }
}

// Shared test context
struct TestContext {
    app: Router,
    functions: Arc<PickyFunctions>,
    plan_fetches: Arc<AtomicUsize>,
}

impl TestContext {
    fn new(plans: Vec<PlanLimits>, with_integrations: bool) -> Self {
        Self::with_identity(Arc::new(AcceptingIdentity), plans, with_integrations)
    }

    fn with_identity(
        identity: Arc<dyn IdentityProvider>,
        plans: Vec<PlanLimits>,
        with_integrations: bool,
    ) -> Self {
        let plan_fetches = Arc::new(AtomicUsize::new(0));
        let functions = Arc::new(PickyFunctions::default());
        let config = Config::for_backend("http://backend.invalid", "anon");
        let state = AppState::from_parts(
            &config,
            Integrations {
                identity,
                functions: functions.clone(),
                plan_source: Arc::new(TablePlans(plans, plan_fetches.clone())),
                caption_model: with_integrations
                    .then(|| Arc::new(CannedModel) as Arc<dyn CaptionModel>),
                image_host: with_integrations.then(|| Arc::new(EchoHost) as Arc<dyn ImageHost>),
            },
        );

        Self {
            app: router::build(state),
            functions,
            plan_fetches,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

fn access_token(exp_offset_secs: i64) -> String {
    let claims = json!({
        "sub": USER,
        "exp": Utc::now().timestamp() + exp_offset_secs,
        "email": "loja@example.com",
        "user_metadata": { "role": "lojista" }
    });
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

fn multipart_upload(folder: &str, filename: &str, data: &[u8], ip: &str) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"folder\"\r\n\r\n{folder}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n",
            b = BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("x-forwarded-for", ip)
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_is_rate_limited_per_origin() {
        let context = TestContext::new(fallback_plan_limits(), true);

        for i in 0..30 {
            let response = context
                .send(multipart_upload("products", "tenis.png", &PNG_HEADER, "203.0.113.7"))
                .await;
            assert_eq!(response.status(), StatusCode::OK, "upload {} rejected", i);
        }

        let limited = context
            .send(multipart_upload("products", "tenis.png", &PNG_HEADER, "203.0.113.7"))
            .await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()[header::RETRY_AFTER], "60");
        let body = json_body(limited).await;
        assert!(body["error"].is_string());

        // A different origin has its own window.
        let other = context
            .send(multipart_upload("products", "tenis.png", &PNG_HEADER, "198.51.100.2"))
            .await;
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_returns_cdn_metadata() {
        let context = TestContext::new(fallback_plan_limits(), true);

        let response = context
            .send(multipart_upload("brand-kit", "logo da loja.png", &PNG_HEADER, "192.0.2.10"))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["public_id"], "fabrica-posts/brand-kit/logodaloja.png");
        assert_eq!(body["bytes"], 16);
    }

    #[tokio::test]
    async fn test_upload_validation_errors() {
        let context = TestContext::new(fallback_plan_limits(), true);

        let bad_folder = context
            .send(multipart_upload("../secrets", "a.png", &PNG_HEADER, "192.0.2.11"))
            .await;
        assert_eq!(bad_folder.status(), StatusCode::BAD_REQUEST);

        let not_image = context
            .send(multipart_upload("posts", "a.png", b"%PDF-1.7 fake", "192.0.2.11"))
            .await;
        assert_eq!(not_image.status(), StatusCode::BAD_REQUEST);
        let body = json_body(not_image).await;
        assert!(body.get("fallback").is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_integrations_offer_fallback() {
        let context = TestContext::new(fallback_plan_limits(), false);

        let upload = context
            .send(multipart_upload("posts", "post.png", &PNG_HEADER, "192.0.2.12"))
            .await;
        assert_eq!(upload.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(json_body(upload).await["fallback"], true);

        let caption = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/captions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "productName": "Bolsa", "objective": "venda" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(caption.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(json_body(caption).await["fallback"], true);
    }

    #[tokio::test]
    async fn test_caption_generation() {
        let context = TestContext::new(fallback_plan_limits(), true);

        let response = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/captions")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "productName": "Bolsa Couro",
                            "price": "R$ 89,90",
                            "objective": "Lançamento"
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["caption"], "Chegou novidade na loja! #moda");
    }

    #[tokio::test]
    async fn test_plans_render_unlimited_and_fall_back() {
        let context = TestContext::new(Vec::new(), true);

        let response = context
            .send(Request::builder().uri("/api/plans").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let plans = json_body(response).await;
        let names: Vec<_> = plans
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["plan_name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["free", "loja", "pro"]);
        assert_eq!(plans[2]["monthly_generations"], 999_999);
        assert_eq!(plans[2]["display"]["monthly_generations"], "∞");

        let unknown = context
            .send(Request::builder().uri("/api/plans/enterprise").body(Body::empty()).unwrap())
            .await;
        assert_eq!(json_body(unknown).await["plan_name"], "free");
    }

    #[tokio::test]
    async fn test_invalidate_requires_a_session() {
        let context = TestContext::new(fallback_plan_limits(), true);

        let anonymous = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/plans/invalidate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let signed_in = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/plans/invalidate")
                    .header(header::AUTHORIZATION, format!("Bearer {}", access_token(3600)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(signed_in.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_invalidate_rejects_tokens_the_provider_refuses() {
        let context =
            TestContext::with_identity(Arc::new(RejectingIdentity), fallback_plan_limits(), true);
        let forged = format!(
            "{}.{}.forged",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(
                json!({ "sub": USER, "exp": Utc::now().timestamp() + 3600 }).to_string()
            )
        );

        let warm = context
            .send(Request::builder().uri("/api/plans").body(Body::empty()).unwrap())
            .await;
        assert_eq!(warm.status(), StatusCode::OK);

        for _ in 0..3 {
            let response = context
                .send(
                    Request::builder()
                        .method("POST")
                        .uri("/api/plans/invalidate")
                        .header(header::AUTHORIZATION, format!("Bearer {}", forged))
                        .header("x-refresh-token", "stolen-refresh")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

            context
                .send(Request::builder().uri("/api/plans").body(Body::empty()).unwrap())
                .await;
        }

        assert_eq!(context.plan_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_function_relay_refreshes_once_and_returns_rotated_tokens() {
        let context = TestContext::new(fallback_plan_limits(), true);
        let stale = access_token(3600);

        let response = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/functions/manage-factory-follow")
                    .header(header::AUTHORIZATION, format!("Bearer {}", stale))
                    .header("x-refresh-token", "old-refresh")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"action":"follow","factory_id":"F1"}"#))
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-access-token"], "fresh-token");
        assert_eq!(response.headers()["x-refresh-token"], "fresh-refresh");

        let body = json_body(response).await;
        assert_eq!(body["data"]["followed"], true);
        assert!(body["error"].is_null());

        let tokens = context.functions.tokens.lock().unwrap().clone();
        assert_eq!(tokens, [stale, "fresh-token".to_string()]);
    }

    #[tokio::test]
    async fn test_function_relay_fails_without_refresh_capability() {
        let context = TestContext::new(fallback_plan_limits(), true);

        let response = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/functions/manage-factory-follow")
                    .header(header::AUTHORIZATION, format!("Bearer {}", access_token(3600)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert!(body["data"].is_null());
        assert_eq!(body["error"], "Invalid JWT");
        assert_eq!(context.functions.tokens.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_function_relay_passes_procedure_errors_through() {
        let context = TestContext::new(fallback_plan_limits(), true);

        let response = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/functions/missing-factory")
                    .header(header::AUTHORIZATION, format!("Bearer {}", access_token(3600)))
                    .header("x-refresh-token", "old-refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-access-token").is_none());
        assert_eq!(json_body(response).await["error"], "factory not found");
    }

    #[tokio::test]
    async fn test_function_names_are_validated() {
        let context = TestContext::new(fallback_plan_limits(), true);

        let response = context
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/functions/Admin_Panel")
                    .header(header::AUTHORIZATION, format!("Bearer {}", access_token(3600)))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(context.functions.tokens.lock().unwrap().is_empty());
    }
}
