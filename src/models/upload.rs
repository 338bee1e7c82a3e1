use serde::{Deserialize, Serialize};

/// Destination folders accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFolder {
    Products,
    BrandKit,
    Posts,
    Avatars,
    Templates,
}

impl UploadFolder {
    /// Every accepted folder.
    pub const ALL: [UploadFolder; 5] = [
        UploadFolder::Products,
        UploadFolder::BrandKit,
        UploadFolder::Posts,
        UploadFolder::Avatars,
        UploadFolder::Templates,
    ];

    /// Parses a folder from the form field; `None` when not allow-listed.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|folder| folder.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadFolder::Products => "products",
            UploadFolder::BrandKit => "brand-kit",
            UploadFolder::Posts => "posts",
            UploadFolder::Avatars => "avatars",
            UploadFolder::Templates => "templates",
        }
    }

    /// Folder path on the image CDN.
    pub fn remote_path(&self) -> String {
        format!("fabrica-posts/{}", self.as_str())
    }
}

/// An image that passed validation and is ready to be sent to the CDN.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub folder: UploadFolder,
    pub filename: String,
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

/// The CDN's description of a stored image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub bytes: u64,
}
