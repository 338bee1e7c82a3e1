use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    error::Result,
    models::caption::CaptionRequest,
    services::captions as caption_service,
    state::AppState,
};

/// Generates a social-media caption for a product.
///
/// Answers 501 with `fallback: true` when no model is configured, so the
/// client can switch to its local template.
pub async fn generate_caption(
    State(state): State<AppState>,
    Json(payload): Json<CaptionRequest>,
) -> Result<impl IntoResponse> {
    let response =
        caption_service::generate_caption(state.caption_model.as_deref(), &payload).await?;

    Ok((StatusCode::OK, Json(response)))
}
