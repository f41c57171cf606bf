use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::images::ImagePayload;

const USER_AGENT: &str = "blog-privacy-scan/1.0";
const MAX_ERROR_BODY: usize = 512;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("model request failed: {0}")]
    Request(String),
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model reply contained no text")]
    EmptyReply,
    #[error("could not build model request: {0}")]
    Encode(String),
}

// ── Request ──────────────────────────────────────────────────────────────────

/// Everything sent to the model for one analysis. The serialized form of the
/// text fields is the document the model reads; images travel as inline
/// parts next to it.
#[derive(Debug, Clone, Serialize)]
pub struct ModelRequest {
    pub prompt: &'static str,
    pub titles: Vec<String>,
    pub texts: Vec<String>,
    pub source_images: Vec<String>,
    #[serde(skip)]
    pub images: Vec<ImagePayload>,
}

impl ModelRequest {
    pub fn document(&self) -> Result<String, UpstreamError> {
        serde_json::to_string_pretty(self).map_err(|e| UpstreamError::Encode(e.to_string()))
    }
}

/// The one seam between the orchestrator and the generative model.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Returns the reply text exactly as the model produced it.
    async fn send(&self, request: &ModelRequest) -> Result<String, UpstreamError>;
}

// ── Gemini wire types ────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    candidate_count: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ── Gemini gateway ───────────────────────────────────────────────────────────

/// One-shot, non-streaming `generateContent` calls. No retries.
pub struct GeminiGateway {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    temperature: f32,
    stop_sequences: Vec<String>,
}

impl GeminiGateway {
    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.base_url.as_str().trim_end_matches('/'),
            config.model
        );
        let endpoint = Url::parse(&endpoint).map_err(|e| UpstreamError::Encode(e.to_string()))?;

        let client = reqwest::ClientBuilder::new()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(config.model_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            stop_sequences: config.stop_sequences.clone(),
        })
    }

    fn build_body<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> Result<GenerateContentRequest<'a>, UpstreamError> {
        let mut parts = vec![Part::Text {
            text: request.document()?,
        }];
        parts.extend(request.images.iter().filter_map(|payload| {
            payload.encoded.as_ref().map(|image| Part::Inline {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data,
                },
            })
        }));

        Ok(GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                candidate_count: 1,
                temperature: self.temperature,
                stop_sequences: &self.stop_sequences,
            },
        })
    }
}

#[async_trait]
impl ModelGateway for GeminiGateway {
    async fn send(&self, request: &ModelRequest) -> Result<String, UpstreamError> {
        let body = self.build_body(request)?;
        tracing::debug!(
            images = request.images.len(),
            titles = request.titles.len(),
            "sending analysis request to model"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Request(format!("TimeoutError: {}", e))
                } else if e.is_connect() {
                    UpstreamError::Request(format!("ConnectError: {}", e))
                } else {
                    UpstreamError::Request(format!("RequestError: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|&i| body.is_char_boundary(i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(UpstreamError::EmptyReply);
        }
        tracing::debug!(reply = %text, "raw model reply");
        Ok(text)
    }
}
