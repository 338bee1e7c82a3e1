use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::time::{Duration, timeout};

use crate::{
    error::{AppError, Result},
    services::uploads as upload_service,
    state::AppState,
    validation::upload::validate_upload,
};

/// Upper bound on reading a single multipart field.
const UPLOAD_TIMEOUT: u64 = 60;

/// Uploads an image to the CDN.
///
/// Expects a multipart form with a `file` part and a `folder` field. The
/// route sits behind the per-origin upload rate limiter.
///
/// # Returns
///
/// The stored image's URL and metadata.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut folder: Option<String> = None;
    let mut filename: Option<String> = None;
    let mut file_data: Option<Vec<u8>> = None;

    let timeout_duration = Duration::from_secs(UPLOAD_TIMEOUT);

    loop {
        match timeout(timeout_duration, multipart.next_field()).await {
            Ok(Ok(Some(field))) => {
                let field_name = field.name().unwrap_or("").to_string();
                match field_name.as_str() {
                    "folder" => {
                        folder = Some(
                            field
                                .text()
                                .await
                                .map_err(|e| AppError::Multipart(format!("folder: {}", e)))?,
                        );
                    }
                    "file" => {
                        filename = field.file_name().map(str::to_string);
                        file_data = Some(
                            field
                                .bytes()
                                .await
                                .map_err(|e| AppError::Multipart(format!("file data: {}", e)))?
                                .to_vec(),
                        );
                    }
                    _ => {}
                }
            }
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                return Err(AppError::Multipart(format!("Parse error: {}", e)));
            }
            Err(_) => return Err(AppError::Multipart("Upload timeout exceeded".into())),
        }
    }

    let image = validate_upload(folder.as_deref(), filename.as_deref(), file_data)?;

    tracing::debug!(
        "📋 Parsed upload - folder: {}, file: {}, type: {}, size: {} bytes",
        image.folder.as_str(),
        image.filename,
        image.mime_type,
        image.data.len()
    );

    let uploaded = upload_service::store_image(state.image_host.as_deref(), image).await?;

    Ok((StatusCode::OK, Json(uploaded)))
}
