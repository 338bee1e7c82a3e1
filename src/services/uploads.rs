use crate::clients::cdn::ImageHost;
use crate::error::{AppError, Result};
use crate::models::upload::{ImageUpload, UploadedImage};

/// Sends a validated image to the CDN.
///
/// # Arguments
///
/// * `host` - The configured image host, if any.
/// * `image` - The validated upload.
///
/// # Returns
///
/// A `Result` containing the stored `UploadedImage`. Fails with
/// `NotConfigured` when no host is set up.
pub async fn store_image(host: Option<&dyn ImageHost>, image: ImageUpload) -> Result<UploadedImage> {
    let host = host.ok_or_else(|| {
        AppError::NotConfigured("Image upload is not configured on this server".to_string())
    })?;

    let folder = image.folder;
    let size = image.data.len();
    tracing::info!("📤 Uploading {} bytes to {}", size, folder.remote_path());

    let uploaded = host.upload(image).await?;

    tracing::info!(
        "✅ Image stored: {} ({}x{}, {} bytes)",
        uploaded.public_id,
        uploaded.width,
        uploaded.height,
        uploaded.bytes
    );

    Ok(uploaded)
}
