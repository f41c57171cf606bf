use serde::{Deserialize, Serialize};

use crate::normalize::NormalizationResult;

pub const DEFAULT_TITLE: &str = "Untitled";

/// One blog entry as submitted by the front-end. A missing or `null` title
/// becomes [`DEFAULT_TITLE`] during extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "content")]
    pub content_markup: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPost {
    pub title: String,
    pub plain_text: String,
    pub image_refs: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub items: Option<Vec<Post>>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub response: NormalizationResult,
    pub execution_time: String,
    pub all_titles: Vec<String>,
    pub all_texts: Vec<String>,
    pub source_images: Vec<String>,
    pub images_base64: Vec<String>,
    pub failed_base64_images: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub message: String,
    pub total_images: usize,
    pub saved_image: Vec<String>,
}
