use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::classifier::{Classifier, RawClassification};

/// Remote zero-shot classifier spoken over the hosted inference HTTP API.
/// The model itself is opaque: input plus candidate labels in, ranked
/// (label, score) pairs out. Works for both text and image models; image
/// requests pass the resource locator as the input payload.
pub struct ZeroShotClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    candidate_labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ZeroShotSettings {
    pub base_url: String,
    pub model: String,
    pub api_token: Option<String>,
    pub candidate_labels: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    labels: Vec<String>,
    scores: Vec<f64>,
}

impl ZeroShotClient {
    pub fn new(settings: ZeroShotSettings) -> Result<Self> {
        if settings.candidate_labels.is_empty() {
            bail!("candidate label set is empty");
        }

        let endpoint = format!(
            "{}/models/{}",
            settings.base_url.trim_end_matches('/'),
            settings.model
        );

        Ok(Self {
            client: reqwest::Client::builder()
                .build()
                .context("failed to build inference HTTP client")?,
            endpoint,
            api_token: settings.api_token,
            candidate_labels: settings.candidate_labels,
        })
    }
}

#[async_trait]
impl Classifier for ZeroShotClient {
    #[tracing::instrument(skip(self, input), fields(endpoint = %self.endpoint))]
    async fn classify(&self, input: &str) -> Result<RawClassification> {
        let body = json!({
            "inputs": input,
            "parameters": { "candidate_labels": &self.candidate_labels },
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("inference request failed")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("inference endpoint returned {status}: {detail}");
        }

        let ranking: InferenceResponse = response
            .json()
            .await
            .context("inference response was not valid JSON")?;
        if ranking.labels.is_empty() || ranking.labels.len() != ranking.scores.len() {
            bail!("inference endpoint returned a malformed ranking");
        }

        Ok(RawClassification {
            labels: ranking.labels,
            scores: ranking.scores,
        })
    }
}
