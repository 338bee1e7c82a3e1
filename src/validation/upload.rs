use crate::error::{AppError, Result};
use crate::models::upload::{ImageUpload, UploadFolder};

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Image types accepted by the CDN, as sniffed from the file's magic bytes.
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Validates a folder name against the allow-list.
///
/// # Arguments
///
/// * `folder` - The raw `folder` form field, if it was sent.
///
/// # Returns
///
/// A `Result` containing the parsed `UploadFolder`.
pub fn validate_folder(folder: Option<&str>) -> Result<UploadFolder> {
    let raw = folder
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::Validation("Missing folder".to_string()))?;

    UploadFolder::parse(raw).ok_or_else(|| {
        let allowed: Vec<_> = UploadFolder::ALL.iter().map(UploadFolder::as_str).collect();
        AppError::Validation(format!(
            "Invalid folder '{}'. Allowed: {}",
            raw,
            allowed.join(", ")
        ))
    })
}

/// Validates image bytes: size bounds and actual content type.
///
/// # Returns
///
/// A `Result` containing the sniffed MIME type.
pub fn validate_image(data: &[u8]) -> Result<&'static str> {
    if data.is_empty() {
        return Err(AppError::Validation("File is empty".to_string()));
    }

    if data.len() > MAX_IMAGE_BYTES {
        return Err(AppError::Validation(format!(
            "File exceeds maximum allowed size ({}MB)",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }

    let mime_type = infer::get(data)
        .map(|kind| kind.mime_type())
        .ok_or_else(|| AppError::Validation("Unrecognized file type".to_string()))?;

    if !ALLOWED_IMAGE_TYPES.contains(&mime_type) {
        return Err(AppError::Validation(format!(
            "Unsupported file type {}. Allowed: JPEG, PNG, WebP, GIF",
            mime_type
        )));
    }

    Ok(mime_type)
}

/// Sanitizes a client-supplied filename down to a safe basename.
pub fn sanitize_filename(filename: Option<&str>, mime_type: &str) -> String {
    let base = filename
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .take(100)
        .collect::<String>();

    let base = base.trim_start_matches('.');
    if base.is_empty() {
        let extension = mime_type.rsplit('/').next().unwrap_or("bin");
        return format!("upload.{}", extension);
    }
    base.to_string()
}

/// Validates a complete upload form.
pub fn validate_upload(
    folder: Option<&str>,
    filename: Option<&str>,
    data: Option<Vec<u8>>,
) -> Result<ImageUpload> {
    let folder = validate_folder(folder)?;
    let data = data.ok_or_else(|| AppError::Validation("Missing file".to_string()))?;
    let mime_type = validate_image(&data)?;

    Ok(ImageUpload {
        folder,
        filename: sanitize_filename(filename, mime_type),
        mime_type,
        data,
    })
}
