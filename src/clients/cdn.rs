use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::clients::extract_error_message;
use crate::config::CloudinaryConfig;
use crate::crypto::signature::sign_params;
use crate::error::{AppError, Result};
use crate::models::upload::{ImageUpload, UploadedImage};

/// Storage for validated images.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<UploadedImage>;
}

#[derive(Deserialize)]
struct CloudinaryResource {
    secure_url: String,
    public_id: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    format: String,
    #[serde(default)]
    bytes: u64,
}

impl From<CloudinaryResource> for UploadedImage {
    fn from(resource: CloudinaryResource) -> Self {
        Self {
            url: resource.secure_url,
            public_id: resource.public_id,
            width: resource.width,
            height: resource.height,
            format: resource.format,
            bytes: resource.bytes,
        }
    }
}

/// `ImageHost` using Cloudinary signed uploads.
#[derive(Clone)]
pub struct CloudinaryHost {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryHost {
    pub fn new(http: reqwest::Client, config: CloudinaryConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: ImageUpload) -> Result<UploadedImage> {
        let folder = image.folder.remote_path();
        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", folder.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );

        let file_part = Part::bytes(image.data)
            .file_name(image.filename)
            .mime_str(image.mime_type)
            .map_err(|e| AppError::Internal(format!("Invalid MIME type: {}", e)))?;

        let form = Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder)
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
            .part("file", file_part);

        let response = self
            .http
            .post(format!(
                "https://api.cloudinary.com/v1_1/{}/image/upload",
                self.config.cloud_name
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Image CDN unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Upstream(format!("Image CDN response failed: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Image CDN rejected upload ({}): {}",
                status,
                extract_error_message(&body)
            )));
        }

        let resource: CloudinaryResource = sonic_rs::from_slice(&body)
            .map_err(|e| AppError::Upstream(format!("Malformed image CDN response: {}", e)))?;

        Ok(resource.into())
    }
}
