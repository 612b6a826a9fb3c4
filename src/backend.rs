//! Client for the generation backend boundary.
//!
//! Every action is one JSON `POST`; responses are normalized into typed
//! payloads and failures carry the backend-provided message verbatim. No
//! retries, a failed call is surfaced to the workflow as-is.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::settings::{AspectRatio, Resolution, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendAction {
    Generate,
    Regenerate,
    RemoveBackground,
}

/// Base64 image as it travels over the wire, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub base64: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    action: BackendAction,
    #[serde(rename = "originalImage")]
    original_image: &'a ImagePayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<SettingsBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsBody<'a> {
    resolution: Resolution,
    aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    number_of_images: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ad_copy_prompt: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(rename = "generatedImages")]
    pub generated_images: Vec<ImagePayload>,
    #[serde(rename = "generatedAdCopies")]
    pub generated_ad_copies: Vec<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Application-level failure reported by the backend; `message` is shown
    /// to the user verbatim.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned an unexpected payload: {0}")]
    Malformed(&'static str),
}

/// Seam between the workflow controller and the real HTTP backend, so the
/// workflow can be driven by a scripted stand-in under test.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        image: &ImagePayload,
        settings: &Settings,
    ) -> Result<GenerateResponse, BackendError>;

    async fn regenerate(
        &self,
        image: &ImagePayload,
        prompt: &str,
        resolution: Resolution,
        aspect_ratio: AspectRatio,
    ) -> Result<ImagePayload, BackendError>;

    async fn remove_background(&self, image: &ImagePayload)
    -> Result<ImagePayload, BackendError>;
}

pub struct HttpBackend {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpBackend {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        body: &RequestBody<'_>,
    ) -> Result<T, BackendError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ApiErrorBody>().await {
                Ok(body) => body.error,
                Err(_) => format!("Server responded with status {}", status.as_u16()),
            };
            tracing::warn!(status = status.as_u16(), %message, "backend call failed");
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

fn require_image(payload: ImagePayload) -> Result<ImagePayload, BackendError> {
    if payload.base64.is_empty() || payload.mime_type.is_empty() {
        return Err(BackendError::Malformed("missing image data"));
    }
    Ok(payload)
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate(
        &self,
        image: &ImagePayload,
        settings: &Settings,
    ) -> Result<GenerateResponse, BackendError> {
        let body = RequestBody {
            action: BackendAction::Generate,
            original_image: image,
            settings: Some(SettingsBody {
                resolution: settings.resolution,
                aspect_ratio: settings.aspect_ratio,
                number_of_images: Some(settings.number_of_images),
                image_prompt: Some(settings.image_prompt()),
                ad_copy_prompt: Some(&settings.ad_copy_prompt),
            }),
            prompt: None,
        };
        self.call(&body).await
    }

    async fn regenerate(
        &self,
        image: &ImagePayload,
        prompt: &str,
        resolution: Resolution,
        aspect_ratio: AspectRatio,
    ) -> Result<ImagePayload, BackendError> {
        let body = RequestBody {
            action: BackendAction::Regenerate,
            original_image: image,
            settings: Some(SettingsBody {
                resolution,
                aspect_ratio,
                number_of_images: None,
                image_prompt: None,
                ad_copy_prompt: None,
            }),
            prompt: Some(prompt),
        };
        require_image(self.call(&body).await?)
    }

    async fn remove_background(
        &self,
        image: &ImagePayload,
    ) -> Result<ImagePayload, BackendError> {
        let body = RequestBody {
            action: BackendAction::RemoveBackground,
            original_image: image,
            settings: None,
            prompt: None,
        };
        require_image(self.call(&body).await?)
    }
}
