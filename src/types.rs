use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyImageRequest {
    pub image_url: String,
}

/// Canonical classification exposed to clients and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: String,
    pub score: f64,
    pub original_label: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
