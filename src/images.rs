use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

const USER_AGENT: &str = "blog-privacy-scan/1.0";
const DEFAULT_MIME: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum ImageFetchError {
    #[error("invalid image URL: {0}")]
    InvalidUrl(String),
    #[error("image host returned {0}")]
    Status(u16),
    #[error("{0}")]
    Request(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

/// Outcome of resolving one URL. `encoded` is `None` when the fetch failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub original_url: String,
    pub encoded: Option<EncodedImage>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResolvedImages {
    pub encoded: Vec<ImagePayload>,
    pub failed: Vec<String>,
}

impl ResolvedImages {
    pub fn base64_data(&self) -> Vec<String> {
        self.encoded
            .iter()
            .filter_map(|p| p.encoded.as_ref().map(|e| e.data.clone()))
            .collect()
    }
}

/// Downloads images and turns them into base64 for the model request.
pub struct ImageResolver {
    client: reqwest::Client,
}

impl ImageResolver {
    pub fn new(timeout: Duration) -> Result<Self, ImageFetchError> {
        let client = reqwest::ClientBuilder::new()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ImageFetchError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<EncodedImage, ImageFetchError> {
        let parsed = Url::parse(url).map_err(|e| ImageFetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ImageFetchError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                ImageFetchError::Request(format!("TimeoutError: {}", e))
            } else if e.is_connect() {
                ImageFetchError::Request(format!("ConnectError: {}", e))
            } else {
                ImageFetchError::Request(format!("RequestError: {}", e))
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ImageFetchError::Status(status.as_u16()));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_lowercase())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_MIME.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageFetchError::Request(e.to_string()))?;

        Ok(EncodedImage {
            mime_type,
            data: STANDARD.encode(&bytes),
        })
    }

    pub async fn resolve(&self, url: &str) -> ImagePayload {
        let encoded = match self.fetch(url).await {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(url, error = %e, "image could not be encoded");
                None
            }
        };
        ImagePayload {
            original_url: url.to_string(),
            encoded,
        }
    }

    /// Resolves URLs one after another; successes and failures both keep
    /// input order.
    pub async fn resolve_all(&self, urls: &[String]) -> ResolvedImages {
        let mut resolved = ResolvedImages::default();
        for url in urls {
            let payload = self.resolve(url).await;
            if payload.encoded.is_some() {
                resolved.encoded.push(payload);
            } else {
                resolved.failed.push(payload.original_url);
            }
        }
        if !resolved.failed.is_empty() {
            tracing::warn!(failed = ?resolved.failed, "some images failed to encode");
        }
        resolved
    }
}
