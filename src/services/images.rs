use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const UPLOAD_FOLDER: &str = "complaints";

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Only JPEG and PNG images are allowed")]
    UnsupportedType,
    #[error("Image must be 5MB or smaller")]
    TooLarge,
    #[error("Image uploads are not configured")]
    Disabled,
    #[error("image host request failed: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for ImageError {
    fn from(err: reqwest::Error) -> Self {
        ImageError::Upstream(err.to_string())
    }
}

impl ImageUpload {
    /// Checks size and declared type, and that the bytes start like a JPEG or PNG.
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge);
        }
        let declared_ok = matches!(
            self.content_type.as_str(),
            "image/jpeg" | "image/jpg" | "image/png"
        );
        let magic_ok = self.bytes.starts_with(&[0xFF, 0xD8, 0xFF])
            || self.bytes.starts_with(&[0x89, b'P', b'N', b'G']);
        if !declared_ok || !magic_ok {
            return Err(ImageError::UnsupportedType);
        }
        Ok(())
    }
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Uploads the image and returns its public URL.
    async fn upload(&self, image: ImageUpload) -> Result<String, ImageError>;
}

pub struct CloudinaryHost {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryHost {
    pub fn new(cloud_name: String, api_key: String, api_secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            cloud_name,
            api_key,
            api_secret,
        }
    }

    fn sign(&self, timestamp: i64) -> String {
        let to_sign = format!("folder={UPLOAD_FOLDER}&timestamp={timestamp}{}", self.api_secret);
        format!("{:x}", Sha256::digest(to_sign.as_bytes()))
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: ImageUpload) -> Result<String, ImageError> {
        image.validate()?;

        let timestamp = Utc::now().timestamp();
        let part = reqwest::multipart::Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;

        let form = reqwest::multipart::Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("folder", UPLOAD_FOLDER)
            .text("signature", self.sign(timestamp))
            .text("signature_algorithm", "sha256")
            .part("file", part);

        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let body: UploadResponse = response.json().await?;
        tracing::info!("Image uploaded to {}", body.secure_url);
        Ok(body.secure_url)
    }
}

pub struct DisabledImageHost;

#[async_trait]
impl ImageHost for DisabledImageHost {
    async fn upload(&self, image: ImageUpload) -> Result<String, ImageError> {
        image.validate()?;
        Err(ImageError::Disabled)
    }
}
